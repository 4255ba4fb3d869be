// THEORY:
// This file is the entry point of the `trail_vision` library crate. It turns a
// video of a colored ball and a color-marked robot into a stream of annotated
// frames with persistent motion trails.
//
// The public surface comes in three layers, each usable on its own:
// 1.  **`core_modules`**: pure building blocks (HSV segmentation, contour
//     location, trails, compositing, annotation, frame sources).
// 2.  **`pipeline` / `playback`**: the synchronous per-frame stack and the
//     Stopped/Paused/Running state machine that paces it.
// 3.  **`worker`**: the state machine on a background tokio task, steered through
//     a cloneable `ControlHandle`.
//
// Presentation (windows, widgets, text rendering) is left to the consumer.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod worker;

pub use crate::config::{ObjectClass, TrackerConfig};
pub use crate::core_modules::annotation::{Annotation, AnnotationShape};
pub use crate::core_modules::detection::{BoundingBox, Detection, Point};
pub use crate::core_modules::frame_source::{FrameSource, ImageSequenceSource, InMemorySource};
pub use crate::core_modules::hsv::{Hsv, HsvRange};
pub use crate::error::{Result, TrackError};
pub use crate::pipeline::{FrameKind, OutputFrame, TrackingPipeline};
pub use crate::playback::{PlaybackController, PlaybackPhase, PlaybackState, TickOutcome};
pub use crate::worker::{ControlHandle, PlaybackStatus, TrackingSession};
