// THEORY:
// The `hsv` module holds the single-pixel color math the segmenter relies on.
// Pixels are converted into the 8-bit hue/saturation/value convention used by
// most vision tooling: hue is halved into 0..=180 so it fits in a byte,
// saturation and value span 0..=255. An `HsvRange` is an inclusive box in that
// space; a pixel belongs to a tracked class when all three channels fall inside.
//
// Nothing in here knows about neighbors, frames or time.

use crate::error::{Result, TrackError};
use image::Rgb;
use serde::{Deserialize, Serialize};

/// Largest hue value in the halved 8-bit hue scale.
pub const HUE_MAX: u8 = 180;

/// Half-width of the hue window built around a picked color.
const PICK_HUE_MARGIN: u8 = 10;
/// Saturation and value floor of a range built around a picked color.
const PICK_MIN_SATURATION_VALUE: u8 = 100;

/// A pixel expressed in 8-bit HSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue in 0..=180 (degrees halved).
    pub h: u8,
    /// Saturation in 0..=255.
    pub s: u8,
    /// Value (brightest channel) in 0..=255.
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }

    /// Converts an RGB pixel into 8-bit HSV.
    pub fn from_rgb(pixel: &Rgb<u8>) -> Self {
        let [red, green, blue] = pixel.0;
        let maximum_channel = red.max(green).max(blue);
        let minimum_channel = red.min(green).min(blue);
        let chroma = (maximum_channel - minimum_channel) as f32;

        let saturation = if maximum_channel == 0 {
            0.0
        } else {
            chroma * 255.0 / maximum_channel as f32
        };

        let hue_degrees = if chroma <= 0.0 {
            0.0
        } else {
            let (r, g, b) = (red as f32, green as f32, blue as f32);
            let mut degrees = if maximum_channel == red {
                60.0 * (g - b) / chroma
            } else if maximum_channel == green {
                120.0 + 60.0 * (b - r) / chroma
            } else {
                240.0 + 60.0 * (r - g) / chroma
            };
            if degrees < 0.0 {
                degrees += 360.0;
            }
            degrees
        };

        Self {
            h: (hue_degrees / 2.0).round() as u8,
            s: saturation.round() as u8,
            v: maximum_channel,
        }
    }
}

/// An inclusive HSV box selecting the pixels of one tracked class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl HsvRange {
    /// Builds a range, rejecting bounds that are inverted or outside the hue scale.
    pub fn new(lower: Hsv, upper: Hsv) -> Result<Self> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.upper.h > HUE_MAX {
            return Err(TrackError::invalid(format!(
                "upper hue {} exceeds {HUE_MAX}",
                self.upper.h
            )));
        }
        let channels = [
            ("hue", self.lower.h, self.upper.h),
            ("saturation", self.lower.s, self.upper.s),
            ("value", self.lower.v, self.upper.v),
        ];
        for (name, low, high) in channels {
            if low > high {
                return Err(TrackError::invalid(format!(
                    "lower {name} {low} is above upper {name} {high}"
                )));
            }
        }
        Ok(())
    }

    /// Builds a range around a color picked by the user: hue within ±10,
    /// saturation and value anywhere from 100 up.
    ///
    /// The hue window is clamped to the scale rather than wrapped, so a pick near
    /// red produces a narrower window on one side.
    pub fn from_picked_color(color: Rgb<u8>) -> Self {
        let hue = Hsv::from_rgb(&color).h.min(HUE_MAX);
        Self {
            lower: Hsv::new(
                hue.saturating_sub(PICK_HUE_MARGIN),
                PICK_MIN_SATURATION_VALUE,
                PICK_MIN_SATURATION_VALUE,
            ),
            upper: Hsv::new((hue + PICK_HUE_MARGIN).min(HUE_MAX), 255, 255),
        }
    }

    #[inline]
    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&hsv.h)
            && (self.lower.s..=self.upper.s).contains(&hsv.s)
            && (self.lower.v..=self.upper.v).contains(&hsv.v)
    }
}
