// THEORY:
// The `color_segmenter` turns a frame into a binary mask of "pixels that look like
// this object". It is a pure function of frame and range.
//
// Steps:
// 1.  **Smoothing**: a Gaussian blur comparable to an 11x11 kernel suppresses
//     sensor noise while leaving small silhouettes intact.
// 2.  **Color space**: the smoothed frame is converted to 8-bit HSV once and can
//     then be thresholded against any number of ranges (one per tracked class).
// 3.  **Thresholding**: a pixel is 255 when its hue, saturation and value all
//     fall inside the inclusive range, 0 otherwise.
// 4.  **Cleanup**: two erosion passes remove speckles, two dilation passes close
//     the small gaps erosion opened, both with a 3x3 square neighborhood.
//
// An empty frame yields an empty mask. A single bad frame never stops tracking.

use crate::core_modules::hsv::{Hsv, HsvRange};
use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use tracing::warn;

/// Standard deviation matching an 11x11 kernel with automatically chosen sigma.
pub const BLUR_SIGMA: f32 = 2.0;
/// Erosion and dilation passes, each with a 3x3 square neighborhood.
pub const MORPHOLOGY_ITERATIONS: u8 = 2;

const IN_RANGE: Luma<u8> = Luma([255]);
const OUT_OF_RANGE: Luma<u8> = Luma([0]);

/// A smoothed frame expressed in HSV, shared by every class segmented from it.
#[derive(Debug, Clone)]
pub struct HsvFrame {
    pub width: u32,
    pub height: u32,
    pixels: Vec<Hsv>,
}

impl HsvFrame {
    /// Blurs `frame` and converts it to HSV.
    pub fn from_frame(frame: &RgbImage) -> Self {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Self {
                width,
                height,
                pixels: Vec::new(),
            };
        }
        let blurred = imageops::blur(frame, BLUR_SIGMA);
        let pixels = blurred.pixels().map(Hsv::from_rgb).collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Hsv {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Thresholds against `range` and cleans the result with erosion then dilation.
    pub fn mask(&self, range: &HsvRange) -> GrayImage {
        if self.is_empty() {
            return GrayImage::new(self.width, self.height);
        }
        let raw = GrayImage::from_fn(self.width, self.height, |x, y| {
            if range.contains(self.get(x, y)) {
                IN_RANGE
            } else {
                OUT_OF_RANGE
            }
        });
        let eroded = erode(&raw, Norm::LInf, MORPHOLOGY_ITERATIONS);
        dilate(&eroded, Norm::LInf, MORPHOLOGY_ITERATIONS)
    }
}

/// Produces the binary mask of `frame` for one color range.
pub fn segment(frame: &RgbImage, range: &HsvRange) -> GrayImage {
    if frame.width() == 0 || frame.height() == 0 {
        warn!(
            width = frame.width(),
            height = frame.height(),
            "segmenting an empty frame, substituting an empty mask"
        );
    }
    HsvFrame::from_frame(frame).mask(range)
}
