// THEORY:
// The `pipeline` module is the per-frame processing stack of the tracker. It owns
// everything that persists between frames of one session: both trail buffers,
// the overlay they are drawn onto, the start marker and the initial frame that
// `load` and `reset` show again.
//
// One call to `process_frame` runs:
// 1.  **Normalization**: resize to the working width, preserving aspect ratio,
//     before any segmentation so mask and displayed geometry agree.
// 2.  **Detection**: one blurred HSV conversion, then mask and locate per class.
// 3.  **Annotation**: outlines and markers on the live frame only.
// 4.  **Trails**: record both centers, redraw both visible trails onto the overlay.
// 5.  **Composition**: blend the overlay over the annotated frame.
//
// It knows nothing about time. Pacing, elapsed time and the source belong to
// `playback`.

use crate::config::TrackerConfig;
use crate::core_modules::annotation::{Annotation, annotate_ball, annotate_robot, annotate_start};
use crate::core_modules::color_segmenter::HsvFrame;
use crate::core_modules::compositor::compose;
use crate::core_modules::detection::{Detection, Point};
use crate::core_modules::object_locator::locate;
use crate::core_modules::trail::{LineStroke, OverlayLayer, TrailBuffer};
use crate::error::{Result, TrackError};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Whether an output frame is the untouched first frame or a tracked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    Initial,
    Tracked,
}

/// One frame handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    /// Zero-based index of the source frame this was produced from.
    pub index: u64,
    pub kind: FrameKind,
    /// Playback time accumulated while running when the frame was produced.
    pub elapsed: Duration,
    pub image: RgbImage,
    pub ball: Detection,
    pub robot: Detection,
    pub annotations: Vec<Annotation>,
}

impl OutputFrame {
    pub(crate) fn initial(image: RgbImage) -> Self {
        Self {
            index: 0,
            kind: FrameKind::Initial,
            elapsed: Duration::ZERO,
            image,
            ball: Detection::none(),
            robot: Detection::none(),
            annotations: Vec::new(),
        }
    }
}

/// What processing one frame produced, before playback stamps it with time.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub image: RgbImage,
    pub ball: Detection,
    pub robot: Detection,
    pub annotations: Vec<Annotation>,
}

/// Resizes `frame` to `working_width`, keeping its aspect ratio.
pub fn prepare_frame(frame: RgbImage, working_width: u32) -> RgbImage {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 || width == working_width {
        return frame;
    }
    let scaled_height = ((height as u64 * working_width as u64) / width as u64).max(1) as u32;
    imageops::resize(&frame, working_width, scaled_height, FilterType::Triangle)
}

/// Session state that outlives a single frame.
#[derive(Debug, Clone, Default)]
pub struct TrackingPipeline {
    ball_trail: TrailBuffer,
    robot_trail: TrailBuffer,
    overlay: Option<OverlayLayer>,
    start_marker: Option<Point>,
    initial_frame: Option<RgbImage>,
}

impl TrackingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts the first frame of a source: sizes the overlay from it and keeps
    /// the normalized copy as the initial frame, which is also returned.
    pub fn prime(&mut self, frame: RgbImage, config: &TrackerConfig) -> Result<RgbImage> {
        let frame = prepare_frame(frame, config.working_width);
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(TrackError::MalformedFrame { width, height });
        }
        self.ball_trail.clear();
        self.robot_trail.clear();
        self.start_marker = None;
        self.overlay = Some(OverlayLayer::new(width, height));
        self.initial_frame = Some(frame.clone());
        Ok(frame)
    }

    /// Runs the whole stack on one source frame. Returns `None` when the frame
    /// was unusable; both trails still advance so the gap shows as a break.
    pub fn process_frame(&mut self, frame: RgbImage, config: &TrackerConfig) -> Option<FrameAnalysis> {
        // --- 1. Normalization ---
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            warn!(error = %TrackError::MalformedFrame { width, height }, "skipping frame");
            self.record_centers(None, None, config);
            return None;
        }
        let mut frame = prepare_frame(frame, config.working_width);
        let overlay = self
            .overlay
            .get_or_insert_with(|| OverlayLayer::new(frame.width(), frame.height()));
        if frame.dimensions() != overlay.dimensions() {
            let (overlay_width, overlay_height) = overlay.dimensions();
            warn!(
                frame = ?frame.dimensions(),
                overlay = ?overlay.dimensions(),
                "frame size changed mid-stream, resampling to the overlay size"
            );
            frame = imageops::resize(&frame, overlay_width, overlay_height, FilterType::Triangle);
        }

        // --- 2. Detection ---
        let hsv = HsvFrame::from_frame(&frame);
        let ball = locate(&hsv.mask(&config.ball.range), config.geometry.center);
        let robot = locate(&hsv.mask(&config.robot.range), config.geometry.center);
        debug!(ball = ?ball.center, robot = ?robot.center, "frame located");

        // --- 3. Annotation ---
        let mut annotations = Vec::new();
        annotations.extend(annotate_ball(&mut frame, &ball, config.ball.min_radius));
        annotations.extend(annotate_robot(
            &mut frame,
            &robot,
            config.robot.min_radius,
            &config.geometry,
        ));

        // --- 4. Trails ---
        self.record_centers(ball.center, robot.center, config);
        if self.start_marker.is_none() {
            self.start_marker = self.ball_trail.newest();
        }
        if let Some(start) = self.start_marker {
            annotations.push(annotate_start(&mut frame, start));
        }

        // --- 5. Composition ---
        let image = match &self.overlay {
            Some(overlay) => compose(&frame, overlay.image(), config.trail.transparency),
            None => frame,
        };

        Some(FrameAnalysis {
            image,
            ball,
            robot,
            annotations,
        })
    }

    fn record_centers(&mut self, ball: Option<Point>, robot: Option<Point>, config: &TrackerConfig) {
        let style = &config.trail;
        let ball_segments = self.ball_trail.record(ball);
        let robot_segments = self.robot_trail.record(robot);
        if let Some(overlay) = self.overlay.as_mut() {
            let stroke = |color: [u8; 3]| LineStroke {
                color: Rgb(color),
                thickness: style.thickness,
                antialiased: style.antialiased,
            };
            overlay.draw_segments(&ball_segments, stroke(style.ball_color));
            overlay.draw_segments(&robot_segments, stroke(style.robot_color));
        }
    }

    /// Forgets both trails, the overlay contents and the start marker. The
    /// initial frame is kept.
    pub fn reset(&mut self) {
        self.ball_trail.clear();
        self.robot_trail.clear();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.clear();
        }
        self.start_marker = None;
    }

    pub fn initial_frame(&self) -> Option<&RgbImage> {
        self.initial_frame.as_ref()
    }

    pub fn overlay(&self) -> Option<&OverlayLayer> {
        self.overlay.as_ref()
    }

    pub fn ball_trail(&self) -> &TrailBuffer {
        &self.ball_trail
    }

    pub fn robot_trail(&self) -> &TrailBuffer {
        &self.robot_trail
    }

    pub fn start_marker(&self) -> Option<Point> {
        self.start_marker
    }
}
