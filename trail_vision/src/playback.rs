// THEORY:
// `PlaybackController` is the synchronous heart of a session: one source, one
// `TrackingPipeline` and a three-state machine.
//
//     Stopped --load--> Paused <--play/pause--> Running
//        ^                ^                        |
//        |                +-------- limit ---------+
//        +------------- end of stream -------------+
//
// Principles:
// 1.  **Injected time**: every time-dependent call takes `now`, so the controller
//     can be driven by wall-clock, virtual or hand-picked instants alike.
// 2.  **Elapsed time only accrues while running**: `play` back-dates the start
//     instant by the time already accumulated, `pause` freezes it.
// 3.  **One frame per tick**: the caller waits `frame_delay` between ticks; the
//     controller never loops on its own.
// 4.  **Failures never leave a half-loaded session**: `load` reads the first frame
//     before touching any state.

use crate::config::{FALLBACK_FRAME_RATE, TrackerConfig};
use crate::core_modules::frame_source::FrameSource;
use crate::error::{Result, TrackError};
use crate::pipeline::{FrameKind, OutputFrame, TrackingPipeline};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlaybackPhase {
    Stopped,
    Paused,
    Running,
}

/// Snapshot of the controller's timing state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    /// Running time accumulated up to the last `pause` or tick.
    pub elapsed: Duration,
    /// Back-dated instant playback would have started at had it never paused.
    pub started_at: Option<Instant>,
    pub limit: Option<Duration>,
    pub frame_delay: Duration,
}

impl PlaybackState {
    fn stopped(config: &TrackerConfig) -> Self {
        Self {
            phase: PlaybackPhase::Stopped,
            elapsed: Duration::ZERO,
            started_at: None,
            limit: config.playback.limit(),
            frame_delay: config.playback.frame_delay(FALLBACK_FRAME_RATE),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Not running; nothing was read.
    Idle,
    Emitted(OutputFrame),
    /// The frame was unusable and produced no output.
    Skipped,
    /// The playback limit was reached and the controller paused itself.
    AutoPaused,
    /// End of stream or a fatal read error; the controller is stopped.
    Finished,
}

pub struct PlaybackController {
    source: Option<Box<dyn FrameSource>>,
    pipeline: TrackingPipeline,
    state: PlaybackState,
    next_frame_index: u64,
}

impl PlaybackController {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            source: None,
            pipeline: TrackingPipeline::new(),
            state: PlaybackState::stopped(config),
            next_frame_index: 0,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.state.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.state.elapsed
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn pipeline(&self) -> &TrackingPipeline {
        &self.pipeline
    }

    pub fn native_frame_rate(&self) -> f64 {
        self.source
            .as_ref()
            .map_or(FALLBACK_FRAME_RATE, |source| source.native_frame_rate())
    }

    /// Re-derives the limit and frame delay from `config`.
    pub fn apply_config(&mut self, config: &TrackerConfig) {
        self.state.limit = config.playback.limit();
        self.state.frame_delay = config.playback.frame_delay(self.native_frame_rate());
    }

    /// Replaces the current source with `source` and returns its initial frame.
    /// On error the previous session is left exactly as it was.
    pub fn load(&mut self, mut source: Box<dyn FrameSource>, config: &TrackerConfig) -> Result<OutputFrame> {
        let first = source.read()?.ok_or_else(|| TrackError::SourceOpen {
            path: source
                .location()
                .map_or_else(|| PathBuf::from("in-memory frames"), Path::to_path_buf),
            reason: "source yielded no frames".into(),
        })?;
        source.seek(0)?;

        let mut pipeline = TrackingPipeline::new();
        let initial = pipeline.prime(first, config)?;

        if let Some(mut previous) = self.source.replace(source) {
            previous.close();
        }
        self.pipeline = pipeline;
        self.next_frame_index = 0;
        self.state.phase = PlaybackPhase::Paused;
        self.state.elapsed = Duration::ZERO;
        self.state.started_at = None;
        self.apply_config(config);
        info!(
            width = initial.width(),
            height = initial.height(),
            frame_rate = self.native_frame_rate(),
            "source loaded"
        );
        Ok(OutputFrame::initial(initial))
    }

    /// Starts or resumes playback. Returns whether the phase changed.
    pub fn play(&mut self, now: Instant) -> bool {
        if self.state.phase != PlaybackPhase::Paused {
            return false;
        }
        self.state.started_at = Some(now.checked_sub(self.state.elapsed).unwrap_or(now));
        self.state.phase = PlaybackPhase::Running;
        info!(elapsed = ?self.state.elapsed, "playback running");
        true
    }

    /// Freezes elapsed time. Pausing anything but a running session is a no-op.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.state.phase != PlaybackPhase::Running {
            return false;
        }
        self.sample_elapsed(now);
        self.state.started_at = None;
        self.state.phase = PlaybackPhase::Paused;
        info!(elapsed = ?self.state.elapsed, "playback paused");
        true
    }

    /// Rewinds to the first frame, forgets every trail and returns the initial
    /// frame again. Without a loaded source there is nothing to rewind.
    pub fn reset(&mut self) -> Result<Option<OutputFrame>> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        source.seek(0)?;
        self.pipeline.reset();
        self.next_frame_index = 0;
        self.state.phase = PlaybackPhase::Paused;
        self.state.elapsed = Duration::ZERO;
        self.state.started_at = None;
        info!("playback reset");
        Ok(self.pipeline.initial_frame().cloned().map(OutputFrame::initial))
    }

    /// Closes the source and stops. Safe to call in any state.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            info!("source released");
        }
        self.state.phase = PlaybackPhase::Stopped;
        self.state.started_at = None;
    }

    /// Advances playback by at most one frame.
    pub fn tick(&mut self, now: Instant, config: &TrackerConfig) -> TickOutcome {
        self.apply_config(config);
        if self.state.phase != PlaybackPhase::Running {
            return TickOutcome::Idle;
        }

        self.sample_elapsed(now);
        if self.limit_reached() {
            self.state.started_at = None;
            self.state.phase = PlaybackPhase::Paused;
            info!(elapsed = ?self.state.elapsed, "playback limit reached, pausing");
            return TickOutcome::AutoPaused;
        }

        let Some(source) = self.source.as_mut() else {
            self.finish();
            return TickOutcome::Finished;
        };
        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(frames = self.next_frame_index, "end of stream");
                self.finish();
                return TickOutcome::Finished;
            }
            Err(e) => {
                warn!(error = %e, "frame read failed, stopping playback");
                self.finish();
                return TickOutcome::Finished;
            }
        };

        let index = self.next_frame_index;
        self.next_frame_index += 1;
        let Some(analysis) = self.pipeline.process_frame(frame, config) else {
            return TickOutcome::Skipped;
        };
        debug!(index, elapsed = ?self.state.elapsed, "frame emitted");
        TickOutcome::Emitted(OutputFrame {
            index,
            kind: FrameKind::Tracked,
            elapsed: self.state.elapsed,
            image: analysis.image,
            ball: analysis.ball,
            robot: analysis.robot,
            annotations: analysis.annotations,
        })
    }

    fn sample_elapsed(&mut self, now: Instant) {
        if let Some(started_at) = self.state.started_at {
            // Never let elapsed time run backwards on an out-of-order `now`.
            self.state.elapsed = self.state.elapsed.max(now.saturating_duration_since(started_at));
        }
    }

    fn limit_reached(&self) -> bool {
        self.state.limit.is_some_and(|limit| self.state.elapsed >= limit)
    }

    fn finish(&mut self) {
        self.state.phase = PlaybackPhase::Stopped;
        self.state.started_at = None;
    }
}
