// THEORY:
// A `FrameSource` is the only thing the tracker knows about video decoding: it
// hands out RGB frames one at a time, reports its native frame rate and can be
// rewound. Opening is the constructor of each implementation, so a source that
// exists has already been opened successfully.
//
// Two implementations live here. `InMemorySource` replays a fixed list of frames
// and is what tests and synthetic demos use. `ImageSequenceSource` walks a
// directory of still images in lexical order and decodes each one on demand.
// Container formats (mp4, avi, ...) belong to the application layer.

use crate::error::{Result, TrackError};
use image::RgbImage;
use std::path::{Path, PathBuf};

pub trait FrameSource: Send {
    /// Returns the next frame, or `None` once the stream is exhausted.
    fn read(&mut self) -> Result<Option<RgbImage>>;

    /// Repositions the stream so the next `read` yields frame `frame_index`.
    fn seek(&mut self, frame_index: u64) -> Result<()>;

    /// Frames per second of the stream as recorded. Zero when unknown.
    fn native_frame_rate(&self) -> f64;

    /// Releases any underlying handle. Reads after `close` yield `None`.
    fn close(&mut self) {}

    /// The file or directory the frames come from, if any.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Replays frames held in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    frames: Vec<RgbImage>,
    frame_rate: f64,
    position: usize,
    closed: bool,
}

impl InMemorySource {
    pub fn new(frames: Vec<RgbImage>, frame_rate: f64) -> Self {
        Self {
            frames,
            frame_rate,
            position: 0,
            closed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for InMemorySource {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.closed {
            return Ok(None);
        }
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        if self.closed {
            return Err(TrackError::SourceRead("seek on a closed source".into()));
        }
        self.position = (frame_index as usize).min(self.frames.len());
        Ok(())
    }

    fn native_frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn close(&mut self) {
        self.closed = true;
        self.frames.clear();
    }
}

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Plays a directory of still images as a video, in lexical file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    directory: PathBuf,
    files: Vec<PathBuf>,
    frame_rate: f64,
    position: usize,
    closed: bool,
}

impl ImageSequenceSource {
    /// Lists the image files of `directory`. Fails if the directory cannot be
    /// read or holds no images.
    pub fn open(directory: impl AsRef<Path>, frame_rate: f64) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let open_error = |reason: String| TrackError::SourceOpen {
            path: directory.clone(),
            reason,
        };

        let entries = std::fs::read_dir(&directory).map_err(|e| open_error(e.to_string()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| open_error(e.to_string()))?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(open_error("directory contains no image files".into()));
        }
        files.sort();

        Ok(Self {
            directory,
            files,
            frame_rate,
            position: 0,
            closed: false,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.closed {
            return Ok(None);
        }
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        let frame = image::open(path)
            .map_err(|e| TrackError::SourceRead(format!("{}: {e}", path.display())))?
            .to_rgb8();
        self.position += 1;
        Ok(Some(frame))
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        if self.closed {
            return Err(TrackError::SourceRead("seek on a closed source".into()));
        }
        self.position = (frame_index as usize).min(self.files.len());
        Ok(())
    }

    fn native_frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.directory)
    }
}
