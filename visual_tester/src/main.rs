use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use trail_vision::worker;
use trail_vision::{FrameKind, FrameSource, ImageSequenceSource, OutputFrame, PlaybackPhase, TrackerConfig};

mod captions;
#[cfg(feature = "opencv")]
mod video_source;

use captions::CaptionPainter;

/// Plays a recording through the tracker and writes every composited frame as a PNG.
#[derive(Parser)]
struct Args {
    /// Directory of still frames, or a video file when built with `--features opencv`.
    input: PathBuf,
    /// Directory the composited frames are written to.
    output: PathBuf,
    /// TOML file with tracker settings; omitted sections keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frame rate of a directory of stills.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Playback speed multiplier.
    #[arg(long)]
    speed: Option<f64>,
    /// Auto-pause after this many seconds of playback.
    #[arg(long)]
    limit: Option<f64>,
    /// Minimum radius, in working-frame pixels, before objects are outlined.
    #[arg(long)]
    min_radius: Option<f32>,
    /// Width frames are resized to before tracking.
    #[arg(long)]
    working_width: Option<u32>,
    /// TrueType font used to caption the ball, robot and start marker.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Caption height in pixels.
    #[arg(long, default_value_t = 16.0)]
    caption_size: f32,
    /// Repeat for more log output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn tracker_config(&self) -> Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::from_toml_file(path)?,
            None => TrackerConfig::default(),
        };
        if let Some(speed) = self.speed {
            config.playback.speed = speed;
        }
        if self.limit.is_some() {
            config.playback.limit_secs = self.limit;
        }
        if let Some(min_radius) = self.min_radius {
            config.ball.min_radius = min_radius;
            config.robot.min_radius = min_radius;
        }
        if let Some(width) = self.working_width {
            config.working_width = width;
        }
        config.validate().context("invalid tracker settings")?;
        Ok(config)
    }

    fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

fn open_source(input: &Path, fps: f64) -> Result<Box<dyn FrameSource>> {
    if input.is_dir() {
        let source = ImageSequenceSource::open(input, fps)?;
        info!(frames = source.frame_count(), "playing image sequence");
        return Ok(Box::new(source));
    }
    open_video(input)
}

#[cfg(feature = "opencv")]
fn open_video(input: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(video_source::VideoFileSource::open(input)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video(input: &Path) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "{} is not a directory; video files need the `opencv` feature",
        input.display()
    )
}

/// Captions and saves frames as they arrive, on the blocking pool.
fn spawn_writer(
    mut frames: mpsc::Receiver<OutputFrame>,
    output: PathBuf,
    captions: Option<Arc<CaptionPainter>>,
) -> JoinHandle<Result<usize>> {
    tokio::spawn(async move {
        let mut written = 0;
        while let Some(frame) = frames.recv().await {
            let name = match frame.kind {
                FrameKind::Initial => "initial.png".to_string(),
                FrameKind::Tracked => format!("frame_{:05}.png", frame.index),
            };
            let path = output.join(name);
            for annotation in &frame.annotations {
                tracing::debug!(index = frame.index, label = annotation.label, shape = ?annotation.shape, "annotation");
            }
            let captions = captions.clone();
            tokio::task::spawn_blocking(move || {
                let mut image = frame.image;
                if let Some(painter) = captions {
                    painter.paint(&mut image, &frame.annotations);
                }
                image.save(&path).with_context(|| format!("writing {}", path.display()))
            })
            .await??;
            written += 1;
        }
        Ok(written)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(args.level())
        .init();

    let config = args.tracker_config()?;
    let captions = args
        .font
        .as_deref()
        .map(|font| CaptionPainter::load(font, args.caption_size).map(Arc::new))
        .transpose()?;
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    // --- 2. Source & Worker ---
    let source = open_source(&args.input, args.fps)?;
    let session = worker::spawn(config)?;
    let control = session.control.clone();
    let mut status = control.subscribe_status();
    let writer = spawn_writer(session.frames, args.output.clone(), captions);

    control.load_boxed(source).await.context("loading the source")?;
    control.play()?;

    // --- 3. Playback until the stream ends, the limit pauses it, or Ctrl-C ---
    tokio::select! {
        result = status.wait_for(|s| s.frames_emitted > 0 && s.phase != PlaybackPhase::Running) => {
            if result.is_err() {
                warn!("worker stopped unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    let final_status = control.status();

    // --- 4. Shutdown ---
    // The worker may already be gone; there is nothing left to release then.
    let _ = control.release();
    session.task.await.context("worker panicked")?;
    let written = writer.await.context("frame writer panicked")??;

    info!(
        phase = ?final_status.phase,
        elapsed = ?final_status.elapsed,
        written,
        output = %args.output.display(),
        "processing complete"
    );
    Ok(())
}
