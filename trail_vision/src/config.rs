// THEORY:
// `TrackerConfig` is the whole tunable surface of the tracker: the two color
// classes, trail styling, playback pacing and the empirically tuned geometry
// constants of the locator. The worker reads one complete snapshot per tick, so
// a change always lands between frames and never halfway through one.
//
// Every field has a default taken from the field-tested tracking application,
// and a config can be loaded from a TOML file where any omitted section falls
// back to those defaults.

use crate::core_modules::hsv::{Hsv, HsvRange};
use crate::error::{Result, TrackError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Width every frame is resized to before segmentation.
pub const DEFAULT_WORKING_WIDTH: u32 = 640;
/// Frame rate assumed when a source reports none.
pub const FALLBACK_FRAME_RATE: f64 = 30.0;

/// The two tracked object classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Ball,
    Robot,
}

/// Color range and size threshold of one tracked class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectClassConfig {
    pub range: HsvRange,
    /// Radius in pixels a detection must exceed before it is annotated.
    pub min_radius: f32,
}

impl ObjectClassConfig {
    pub fn ball() -> Self {
        Self {
            range: HsvRange {
                lower: Hsv::new(5, 150, 150),
                upper: Hsv::new(15, 255, 255),
            },
            min_radius: 10.0,
        }
    }

    pub fn robot() -> Self {
        Self {
            range: HsvRange {
                lower: Hsv::new(140, 0, 150),
                upper: Hsv::new(170, 255, 255),
            },
            min_radius: 10.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.range.validate()?;
        validate_min_radius(self.min_radius)
    }
}

pub(crate) fn validate_min_radius(min_radius: f32) -> Result<()> {
    if min_radius.is_finite() && min_radius > 0.0 {
        Ok(())
    } else {
        Err(TrackError::invalid(format!(
            "min radius must be positive, got {min_radius}"
        )))
    }
}

/// How trails are drawn on the overlay and blended into the output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailStyle {
    pub thickness: u32,
    pub antialiased: bool,
    /// Weight of the overlay when blended over the live frame, in `[0, 1]`.
    pub transparency: f32,
    pub ball_color: [u8; 3],
    pub robot_color: [u8; 3],
}

impl Default for TrailStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            antialiased: true,
            transparency: 1.0,
            ball_color: [255, 0, 0],
            robot_color: [255, 0, 255],
        }
    }
}

impl TrailStyle {
    pub fn validate(&self) -> Result<()> {
        if self.thickness == 0 {
            return Err(TrackError::invalid("line thickness must be at least 1"));
        }
        validate_transparency(self.transparency)
    }
}

pub(crate) fn validate_transparency(transparency: f32) -> Result<()> {
    if (0.0..=1.0).contains(&transparency) {
        Ok(())
    } else {
        Err(TrackError::invalid(format!(
            "line transparency must lie in [0, 1], got {transparency}"
        )))
    }
}

/// Pacing of the playback loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Multiplier over the source's native frame rate; 1.0 is native speed.
    pub speed: f64,
    /// Explicit per-frame delay that overrides the speed-derived one.
    pub frame_delay_ms: Option<u64>,
    /// Playback auto-pauses once this many seconds have elapsed.
    pub limit_secs: Option<f64>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            frame_delay_ms: None,
            limit_secs: None,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(TrackError::invalid(format!(
                "speed multiplier must be positive, got {}",
                self.speed
            )));
        }
        if self.frame_delay_ms == Some(0) {
            return Err(TrackError::invalid("frame delay must be at least 1 ms"));
        }
        if let Some(limit) = self.limit_secs {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(TrackError::invalid(format!(
                    "playback limit must be positive, got {limit}"
                )));
            }
        }
        Ok(())
    }

    /// Delay between ticks for a source running at `native_frame_rate`.
    pub fn frame_delay(&self, native_frame_rate: f64) -> Duration {
        if let Some(ms) = self.frame_delay_ms {
            return Duration::from_millis(ms);
        }
        let rate = if native_frame_rate.is_finite() && native_frame_rate > 0.0 {
            native_frame_rate
        } else {
            FALLBACK_FRAME_RATE
        };
        Duration::from_secs_f64(1.0 / (rate * self.speed))
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit_secs.map(Duration::from_secs_f64)
    }
}

/// Which point of the dominant contour is reported as the object's center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CenterStrategy {
    /// Area-weighted centroid from first-order moments.
    Centroid,
    /// Center of the minimum enclosing circle.
    EnclosingCircle,
}

/// Empirically tuned constants of detection and annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorGeometry {
    pub center: CenterStrategy,
    /// The robot is annotated only when its radius exceeds `min_radius` times this.
    pub robot_size_factor: f32,
    pub robot_box_width_scale: f32,
    /// The colored marker sits on top of the chassis, so the box is stretched downward.
    pub robot_box_height_scale: f32,
}

impl Default for LocatorGeometry {
    fn default() -> Self {
        Self {
            center: CenterStrategy::Centroid,
            robot_size_factor: 2.0,
            robot_box_width_scale: 1.0,
            robot_box_height_scale: 2.0,
        }
    }
}

impl LocatorGeometry {
    pub fn validate(&self) -> Result<()> {
        let factors = [
            ("robot size factor", self.robot_size_factor),
            ("robot box width scale", self.robot_box_width_scale),
            ("robot box height scale", self.robot_box_height_scale),
        ];
        for (name, factor) in factors {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(TrackError::invalid(format!("{name} must be positive, got {factor}")));
            }
        }
        Ok(())
    }
}

/// The complete configuration of a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub ball: ObjectClassConfig,
    pub robot: ObjectClassConfig,
    pub trail: TrailStyle,
    pub playback: PlaybackConfig,
    pub geometry: LocatorGeometry,
    pub working_width: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ball: ObjectClassConfig::ball(),
            robot: ObjectClassConfig::robot(),
            trail: TrailStyle::default(),
            playback: PlaybackConfig::default(),
            geometry: LocatorGeometry::default(),
            working_width: DEFAULT_WORKING_WIDTH,
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TrackerConfig =
            toml::from_str(text).map_err(|e| TrackError::invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TrackError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn class(&self, class: ObjectClass) -> &ObjectClassConfig {
        match class {
            ObjectClass::Ball => &self.ball,
            ObjectClass::Robot => &self.robot,
        }
    }

    pub fn class_mut(&mut self, class: ObjectClass) -> &mut ObjectClassConfig {
        match class {
            ObjectClass::Ball => &mut self.ball,
            ObjectClass::Robot => &mut self.robot,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.ball.validate()?;
        self.robot.validate()?;
        self.trail.validate()?;
        self.playback.validate()?;
        self.geometry.validate()?;
        if self.working_width == 0 {
            return Err(TrackError::invalid("working width must be at least 1 pixel"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.working_width, 640);
        assert_eq!(config.ball.range.lower, Hsv::new(5, 150, 150));
        assert_eq!(config.robot.range.upper, Hsv::new(170, 255, 255));
    }

    #[test]
    fn frame_delay_follows_rate_and_speed() {
        let mut playback = PlaybackConfig::default();
        assert_eq!(playback.frame_delay(50.0), Duration::from_millis(20));

        playback.speed = 2.0;
        assert_eq!(playback.frame_delay(50.0), Duration::from_millis(10));

        playback.frame_delay_ms = Some(7);
        assert_eq!(playback.frame_delay(50.0), Duration::from_millis(7));
    }

    #[test]
    fn unknown_frame_rate_falls_back() {
        let playback = PlaybackConfig::default();
        assert_eq!(
            playback.frame_delay(0.0),
            Duration::from_secs_f64(1.0 / FALLBACK_FRAME_RATE)
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TrackerConfig::from_toml_str(
            r#"
            working_width = 320

            [playback]
            limit_secs = 10.0

            [ball]
            min_radius = 4.0
            range = { lower = { h = 20, s = 100, v = 100 }, upper = { h = 40, s = 255, v = 255 } }
            "#,
        )
        .unwrap();

        assert_eq!(config.working_width, 320);
        assert_eq!(config.playback.limit(), Some(Duration::from_secs(10)));
        assert_eq!(config.playback.speed, 1.0);
        assert_eq!(config.ball.min_radius, 4.0);
        assert_eq!(config.robot, ObjectClassConfig::robot());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = TrackerConfig::default();
        config.trail.transparency = 1.5;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.ball.min_radius = 0.0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.playback.frame_delay_ms = Some(0);
        assert!(config.validate().is_err());

        assert!(TrackerConfig::from_toml_str("working_width = 0").is_err());
    }
}
