use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};
use trail_vision::{FrameSource, Result, TrackError};

/// A video container decoded by OpenCV.
pub struct VideoFileSource {
    capture: VideoCapture,
    frame_rate: f64,
    path: PathBuf,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let open_error = |reason: String| TrackError::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };
        let capture = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)
            .map_err(|e| open_error(e.to_string()))?;
        if !capture.is_opened().map_err(|e| open_error(e.to_string()))? {
            return Err(open_error("container could not be opened".into()));
        }
        let frame_rate = capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        Ok(Self {
            capture,
            frame_rate,
            path: path.to_path_buf(),
        })
    }
}

fn read_error(e: opencv::Error) -> TrackError {
    TrackError::SourceRead(e.to_string())
}

/// Converts a BGR `Mat` into an RGB image.
fn to_rgb_image(frame: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(read_error)?;
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let bytes = rgb.data_bytes().map_err(read_error)?.to_vec();
    RgbImage::from_raw(width, height, bytes).ok_or(TrackError::MalformedFrame { width, height })
}

impl FrameSource for VideoFileSource {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        let mut frame = Mat::default();
        match self.capture.read(&mut frame) {
            Ok(true) if !frame.empty() => to_rgb_image(&frame).map(Some),
            Ok(_) => Ok(None),
            Err(e) => Err(read_error(e)),
        }
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.capture
            .set(videoio::CAP_PROP_POS_FRAMES, frame_index as f64)
            .map_err(read_error)?;
        Ok(())
    }

    fn native_frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn close(&mut self) {
        let _ = self.capture.release();
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
