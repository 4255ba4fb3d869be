// THEORY:
// The playback loop runs as a single spawned tokio task so the caller's thread
// (a UI, a CLI, a test) never blocks on decoding or processing. The task owns the
// `PlaybackController` outright; nothing else touches it.
//
// Channels:
// 1.  **Commands** (unbounded mpsc, inward): load, play, pause, reset, release.
//     They are polled with priority over the frame timer, so a command is acted
//     on before the next tick starts.
// 2.  **Configuration** (watch, inward): the whole `TrackerConfig` is replaced
//     atomically by the `ControlHandle` setters. The worker clones one snapshot
//     per tick, so a frame is never processed with half of an HSV range updated.
// 3.  **Frames** (bounded mpsc, outward): every emitted `OutputFrame`. A slow
//     consumer applies back-pressure to the loop instead of growing a queue.
//     While a frame waits for room the worker keeps reading commands: play and
//     pause apply at once, load and reset queue up behind the frame, and
//     release drops the frame and ends the loop.
// 4.  **Status** (watch, outward): the latest phase and elapsed time.
//
// The worker ends when `release` is sent, when every `ControlHandle` is dropped,
// or when the frame receiver is dropped. End of stream only stops playback.

use crate::config::{ObjectClass, TrackerConfig, validate_min_radius, validate_transparency};
use crate::core_modules::frame_source::FrameSource;
use crate::core_modules::hsv::HsvRange;
use crate::error::{Result, TrackError};
use crate::pipeline::OutputFrame;
use crate::playback::{PlaybackController, PlaybackPhase, TickOutcome};
use image::Rgb;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Output frames buffered before the loop waits on the consumer.
pub const FRAME_CHANNEL_CAPACITY: usize = 8;

/// What the worker last reported about itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub phase: PlaybackPhase,
    pub elapsed: Duration,
    pub frames_emitted: u64,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Stopped,
            elapsed: Duration::ZERO,
            frames_emitted: 0,
        }
    }
}

enum Command {
    Load {
        source: Box<dyn FrameSource>,
        reply: oneshot::Sender<Result<()>>,
    },
    Play,
    Pause,
    Reset {
        reply: oneshot::Sender<Result<()>>,
    },
    Release,
}

/// A running session: the handle to steer it, its frames and its task.
pub struct TrackingSession {
    pub control: ControlHandle,
    pub frames: mpsc::Receiver<OutputFrame>,
    pub task: JoinHandle<()>,
}

/// Spawns the playback worker on the current tokio runtime.
pub fn spawn(config: TrackerConfig) -> Result<TrackingSession> {
    spawn_with_capacity(config, FRAME_CHANNEL_CAPACITY)
}

pub fn spawn_with_capacity(config: TrackerConfig, frame_capacity: usize) -> Result<TrackingSession> {
    config.validate()?;
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::channel(frame_capacity.max(1));
    let (status_tx, status_rx) = watch::channel(PlaybackStatus::default());
    let (config_tx, config_rx) = watch::channel(config.clone());

    let worker = PlaybackWorker {
        controller: PlaybackController::new(&config),
        config: config_rx,
        commands: command_rx,
        frames: frame_tx,
        status: status_tx,
        frames_emitted: 0,
        deferred: VecDeque::new(),
    };
    let task = tokio::spawn(worker.run());

    Ok(TrackingSession {
        control: ControlHandle {
            commands: command_tx,
            config: Arc::new(config_tx),
            status: status_rx,
        },
        frames: frame_rx,
        task,
    })
}

struct PlaybackWorker {
    controller: PlaybackController,
    config: watch::Receiver<TrackerConfig>,
    commands: mpsc::UnboundedReceiver<Command>,
    frames: mpsc::Sender<OutputFrame>,
    status: watch::Sender<PlaybackStatus>,
    frames_emitted: u64,
    /// Commands that arrived while a frame was waiting for room.
    deferred: VecDeque<Command>,
}

impl PlaybackWorker {
    async fn run(mut self) {
        info!("playback worker started");
        loop {
            if let Some(command) = self.deferred.pop_front() {
                if !self.handle(command).await {
                    break;
                }
                continue;
            }
            let delay = {
                let config = self.config.borrow();
                self.controller.apply_config(&config);
                self.controller.state().frame_delay
            };

            let keep_running = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => false,
                },
                _ = tokio::time::sleep(delay) => self.tick().await,
            };
            if !keep_running {
                break;
            }
        }
        self.controller.release();
        self.publish_status();
        info!(frames = self.frames_emitted, "playback worker stopped");
    }

    /// Returns `false` once the worker should shut down.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Load { source, reply } => {
                let config = self.config.borrow().clone();
                match self.controller.load(source, &config) {
                    Ok(initial) => {
                        self.frames_emitted = 0;
                        self.publish_status();
                        let _ = reply.send(Ok(()));
                        return self.emit(initial).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "load failed");
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Play | Command::Pause => self.steer(&command),
            Command::Reset { reply } => {
                let outcome = self.controller.reset();
                self.publish_status();
                match outcome {
                    Ok(initial) => {
                        let _ = reply.send(Ok(()));
                        if let Some(initial) = initial {
                            return self.emit(initial).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "reset failed");
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Release => return false,
        }
        true
    }

    async fn tick(&mut self) -> bool {
        let now = tokio::time::Instant::now().into_std();
        let config = self.config.borrow().clone();
        let outcome = self.controller.tick(now, &config);
        match outcome {
            TickOutcome::Idle => true,
            TickOutcome::Emitted(frame) => {
                self.frames_emitted += 1;
                self.publish_status();
                self.emit(frame).await
            }
            TickOutcome::Skipped | TickOutcome::AutoPaused | TickOutcome::Finished => {
                self.publish_status();
                true
            }
        }
    }

    /// Applies play or pause. Other commands are ignored.
    fn steer(&mut self, command: &Command) {
        let now = tokio::time::Instant::now().into_std();
        match command {
            Command::Play => self.controller.play(now),
            Command::Pause => self.controller.pause(now),
            _ => return,
        };
        self.publish_status();
    }

    /// Waits for room in the frame channel without going deaf to commands.
    async fn emit(&mut self, frame: OutputFrame) -> bool {
        debug!(index = frame.index, kind = ?frame.kind, "sending frame");
        let frames = self.frames.clone();
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Release) | None => {
                        info!(index = frame.index, "released with a frame still undelivered");
                        return false;
                    }
                    Some(command @ (Command::Play | Command::Pause)) => self.steer(&command),
                    Some(command) => self.deferred.push_back(command),
                },
                permit = frames.reserve() => match permit {
                    Ok(permit) => {
                        permit.send(frame);
                        return true;
                    }
                    Err(_) => {
                        info!("frame receiver dropped, shutting down");
                        return false;
                    }
                },
            }
        }
    }

    fn publish_status(&self) {
        let state = self.controller.state();
        let status = PlaybackStatus {
            phase: state.phase,
            elapsed: state.elapsed,
            frames_emitted: self.frames_emitted,
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Cloneable remote control of a running worker.
#[derive(Clone)]
pub struct ControlHandle {
    commands: mpsc::UnboundedSender<Command>,
    config: Arc<watch::Sender<TrackerConfig>>,
    status: watch::Receiver<PlaybackStatus>,
}

impl ControlHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| TrackError::WorkerStopped)
    }

    async fn request(&self, build: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply))?;
        response.await.map_err(|_| TrackError::WorkerStopped)?
    }

    /// Replaces the current source. Resolves once the source has been opened
    /// and its initial frame is on its way.
    pub async fn load(&self, source: impl FrameSource + 'static) -> Result<()> {
        self.load_boxed(Box::new(source)).await
    }

    pub async fn load_boxed(&self, source: Box<dyn FrameSource>) -> Result<()> {
        self.request(|reply| Command::Load { source, reply }).await
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Stops playback, closes the source and ends the worker.
    pub fn release(&self) -> Result<()> {
        self.send(Command::Release)
    }

    pub fn status(&self) -> PlaybackStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.clone()
    }

    /// The configuration the next tick will use.
    pub fn config(&self) -> TrackerConfig {
        self.config.borrow().clone()
    }

    /// Applies `change` to the live configuration. The result is validated as a
    /// whole and only published when valid; otherwise the previous value stays.
    pub fn update_config(&self, change: impl FnOnce(&mut TrackerConfig)) -> Result<()> {
        let mut outcome = Ok(());
        self.config.send_if_modified(|config| {
            let mut candidate = config.clone();
            change(&mut candidate);
            if let Err(e) = candidate.validate() {
                outcome = Err(e);
                return false;
            }
            let changed = *config != candidate;
            *config = candidate;
            changed
        });
        outcome
    }

    pub fn replace_config(&self, config: TrackerConfig) -> Result<()> {
        self.update_config(|current| *current = config)
    }

    pub fn set_range(&self, class: ObjectClass, range: HsvRange) -> Result<()> {
        range.validate()?;
        self.update_config(|config| config.class_mut(class).range = range)
    }

    pub fn set_ball_range(&self, range: HsvRange) -> Result<()> {
        self.set_range(ObjectClass::Ball, range)
    }

    pub fn set_robot_range(&self, range: HsvRange) -> Result<()> {
        self.set_range(ObjectClass::Robot, range)
    }

    pub fn pick_ball_color(&self, color: Rgb<u8>) -> Result<()> {
        self.set_ball_range(HsvRange::from_picked_color(color))
    }

    pub fn pick_robot_color(&self, color: Rgb<u8>) -> Result<()> {
        self.set_robot_range(HsvRange::from_picked_color(color))
    }

    /// Sets the minimum radius of both classes.
    pub fn set_min_radius(&self, min_radius: f32) -> Result<()> {
        validate_min_radius(min_radius)?;
        self.update_config(|config| {
            config.ball.min_radius = min_radius;
            config.robot.min_radius = min_radius;
        })
    }

    /// Sets the speed multiplier and drops any explicit frame delay.
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.update_config(|config| {
            config.playback.speed = speed;
            config.playback.frame_delay_ms = None;
        })
    }

    /// Overrides the speed-derived delay. Rejects delays under one millisecond.
    pub fn set_frame_delay(&self, delay: Duration) -> Result<()> {
        let ms = u64::try_from(delay.as_millis())
            .map_err(|_| TrackError::invalid(format!("frame delay {delay:?} is too long")))?;
        if ms == 0 {
            return Err(TrackError::invalid(format!(
                "frame delay must be at least 1 ms, got {delay:?}"
            )));
        }
        self.update_config(|config| config.playback.frame_delay_ms = Some(ms))
    }

    pub fn set_playback_limit(&self, limit: Option<Duration>) -> Result<()> {
        self.update_config(|config| config.playback.limit_secs = limit.map(|l| l.as_secs_f64()))
    }

    pub fn set_line_transparency(&self, transparency: f32) -> Result<()> {
        validate_transparency(transparency)?;
        self.update_config(|config| config.trail.transparency = transparency)
    }

    pub fn set_line_thickness(&self, thickness: u32) -> Result<()> {
        self.update_config(|config| config.trail.thickness = thickness)
    }

    pub fn set_line_color(&self, class: ObjectClass, color: Rgb<u8>) -> Result<()> {
        self.update_config(|config| match class {
            ObjectClass::Ball => config.trail.ball_color = color.0,
            ObjectClass::Robot => config.trail.robot_color = color.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_source::InMemorySource;
    use crate::core_modules::hsv::Hsv;
    use crate::pipeline::FrameKind;
    use image::RgbImage;

    fn config() -> TrackerConfig {
        TrackerConfig {
            working_width: 16,
            ..TrackerConfig::default()
        }
    }

    fn source(count: usize) -> InMemorySource {
        InMemorySource::new(vec![RgbImage::new(16, 12); count], 30.0)
    }

    fn drain(mut frames: mpsc::Receiver<OutputFrame>) -> JoinHandle<Vec<OutputFrame>> {
        tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(frame) = frames.recv().await {
                received.push(frame);
            }
            received
        })
    }

    #[tokio::test(start_paused = true)]
    async fn load_sends_the_initial_frame() {
        let mut session = spawn(config()).unwrap();
        session.control.load(source(3)).await.unwrap();

        let initial = session.frames.recv().await.unwrap();
        assert_eq!(initial.kind, FrameKind::Initial);
        assert_eq!(session.control.status().phase, PlaybackPhase::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_is_reported_to_the_caller() {
        let session = spawn(config()).unwrap();
        let err = session.control.load(source(0)).await.unwrap_err();
        assert!(matches!(err, TrackError::SourceOpen { .. }));
        assert_eq!(session.control.status().phase, PlaybackPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_leaves_the_status_alone() {
        let session = spawn(config()).unwrap();
        let control = session.control.clone();
        let mut status = control.subscribe_status();
        let _frames = drain(session.frames);

        control.load(source(5)).await.unwrap();
        control.play().unwrap();
        let finished = *status
            .wait_for(|s| s.phase == PlaybackPhase::Stopped && s.frames_emitted > 0)
            .await
            .unwrap();

        assert!(control.load(source(0)).await.is_err());
        assert_eq!(control.status(), finished);
        assert!(!status.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn playback_runs_to_the_end_and_can_be_reset() {
        let session = spawn(config()).unwrap();
        let control = session.control.clone();
        let mut status = control.subscribe_status();
        let frames = drain(session.frames);

        control.load(source(5)).await.unwrap();
        control.play().unwrap();
        let finished = *status
            .wait_for(|s| s.phase == PlaybackPhase::Stopped && s.frames_emitted > 0)
            .await
            .unwrap();
        assert_eq!(finished.frames_emitted, 5);

        control.reset().await.unwrap();
        assert_eq!(control.status().phase, PlaybackPhase::Paused);
        assert_eq!(control.status().elapsed, Duration::ZERO);

        control.release().unwrap();
        session.task.await.unwrap();
        let received = frames.await.unwrap();
        let kinds: Vec<_> = received.iter().map(|f| f.kind).collect();
        assert_eq!(kinds.first(), Some(&FrameKind::Initial));
        assert_eq!(kinds.last(), Some(&FrameKind::Initial));
        assert_eq!(received.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_pauses_a_long_stream() {
        let mut config = config();
        config.playback.limit_secs = Some(10.0);
        let session = spawn(config).unwrap();
        let control = session.control.clone();
        let mut status = control.subscribe_status();
        let frames = drain(session.frames);

        control.load(source(900)).await.unwrap();
        control.play().unwrap();
        let paused = *status
            .wait_for(|s| s.phase == PlaybackPhase::Paused && s.elapsed >= Duration::from_secs(10))
            .await
            .unwrap();
        assert!(paused.elapsed <= Duration::from_millis(10_100));
        // The timer wheel rounds each wait up to whole milliseconds.
        assert!((280..=301).contains(&paused.frames_emitted));

        control.release().unwrap();
        session.task.await.unwrap();
        frames.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_elapsed_time() {
        let session = spawn(config()).unwrap();
        let control = session.control.clone();
        let mut status = control.subscribe_status();
        let _frames = drain(session.frames);

        control.load(source(900)).await.unwrap();
        control.play().unwrap();
        status
            .wait_for(|s| s.elapsed >= Duration::from_secs(1))
            .await
            .unwrap();
        control.pause().unwrap();
        let paused = *status
            .wait_for(|s| s.phase == PlaybackPhase::Paused)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(control.status().elapsed, paused.elapsed);
        assert_eq!(control.status().frames_emitted, paused.frames_emitted);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_frame_receiver_ends_the_worker() {
        let session = spawn(config()).unwrap();
        drop(session.frames);
        session.control.load(source(3)).await.unwrap();
        session.task.await.unwrap();
        assert!(session.control.play().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn release_ends_the_worker_while_the_consumer_stalls() {
        let session = spawn_with_capacity(config(), 1).unwrap();
        let control = session.control.clone();
        let mut status = control.subscribe_status();
        // Held but never read: the initial frame fills the channel.
        let _frames = session.frames;

        control.load(source(100)).await.unwrap();
        control.play().unwrap();
        status.wait_for(|s| s.frames_emitted >= 1).await.unwrap();

        // The first tracked frame is still waiting for room.
        control.pause().unwrap();
        status
            .wait_for(|s| s.phase == PlaybackPhase::Paused)
            .await
            .unwrap();

        control.release().unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.task)
            .await
            .expect("worker kept running after release")
            .unwrap();
        assert_eq!(control.status().phase, PlaybackPhase::Stopped);
        assert!(matches!(control.play(), Err(TrackError::WorkerStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_after_release_fail() {
        let session = spawn(config()).unwrap();
        session.control.release().unwrap();
        session.task.await.unwrap();

        assert!(matches!(session.control.play(), Err(TrackError::WorkerStopped)));
        assert!(matches!(
            session.control.load(source(1)).await,
            Err(TrackError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn invalid_settings_keep_the_previous_value() {
        let session = spawn(config()).unwrap();
        let control = session.control;
        let before = control.config();

        let inverted = HsvRange {
            lower: Hsv::new(50, 0, 0),
            upper: Hsv::new(10, 255, 255),
        };
        assert!(control.set_ball_range(inverted).is_err());
        assert!(control.set_line_transparency(1.2).is_err());
        assert!(control.set_min_radius(-1.0).is_err());
        assert!(control.set_speed(0.0).is_err());
        assert!(control.set_line_thickness(0).is_err());
        assert!(control.set_frame_delay(Duration::ZERO).is_err());
        assert!(control.set_frame_delay(Duration::from_micros(500)).is_err());
        assert_eq!(control.config(), before);
    }

    #[tokio::test]
    async fn settings_are_published_whole() {
        let session = spawn(config()).unwrap();
        let control = session.control;

        control.pick_robot_color(Rgb([0, 0, 255])).unwrap();
        control.set_min_radius(4.0).unwrap();
        control.set_frame_delay(Duration::from_millis(50)).unwrap();
        control.set_line_color(ObjectClass::Ball, Rgb([0, 255, 0])).unwrap();
        control.set_playback_limit(Some(Duration::from_secs(3))).unwrap();

        let config = control.config();
        assert_eq!(config.robot.range, HsvRange::from_picked_color(Rgb([0, 0, 255])));
        assert_eq!(config.ball.min_radius, 4.0);
        assert_eq!(config.robot.min_radius, 4.0);
        assert_eq!(config.playback.frame_delay_ms, Some(50));
        assert_eq!(config.trail.ball_color, [0, 255, 0]);
        assert_eq!(config.playback.limit_secs, Some(3.0));

        control.set_speed(2.0).unwrap();
        assert_eq!(control.config().playback.frame_delay_ms, None);
    }
}
