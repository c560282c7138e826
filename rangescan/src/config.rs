// THEORY:
// Configuration for the scanner, the robots and the simulation harness, loaded
// from one TOML file with `[scan] [agent] [simulation] [arena] [[robots]]`
// tables.
//
// Key architectural principles:
// 1.  **Defaults Everywhere**: Every table and key is optional. Missing keys
//     fall back to a 16x16 scan at 120°, 10 ms per pixel and 50 m range.
// 2.  **Validate On Use**: Each table checks itself where it is turned into a
//     runtime value (`ScanGeometry::new`, `AgentConfig::validate`,
//     `SimulationConfig::validate`).

use crate::core_modules::scan_engine::DEFAULT_TARGET_PREFIX;
use crate::error::{RangeScanError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file.
#[derive(Clone, Debug, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default = "default_robots")]
    pub robots: Vec<RobotSpec>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            agent: AgentConfig::default(),
            simulation: SimulationConfig::default(),
            arena: ArenaConfig::default(),
            robots: default_robots(),
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(contents)?;
        config.agent.validate()?;
        config.simulation.validate()?;
        Ok(config)
    }
}

/// Rangefinder settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Pixels per scan line.
    pub scan_line_width: u32,
    /// Scan lines per frame.
    pub scan_line_count: u32,
    /// Horizontal field of view in degrees.
    pub horizontal_fov_deg: f32,
    /// Dwell time per pixel in seconds.
    pub pixel_scan_period_secs: f64,
    /// Longest distance a ray can report.
    pub max_ray_cast_distance: f32,
    /// Tag prefix of objects that raise ball-hit events.
    pub target_prefix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_line_width: 16,
            scan_line_count: 16,
            horizontal_fov_deg: 120.0,
            pixel_scan_period_secs: 0.01,
            max_ray_cast_distance: 50.0,
            target_prefix: DEFAULT_TARGET_PREFIX.to_string(),
        }
    }
}

/// Behavior settings shared by every robot.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Forward speed in units per second.
    pub speed: f32,
    /// Seconds between two heading decisions.
    pub reaim_interval_secs: f64,
    /// Sightings closer than this are the same ball.
    pub min_ball_distance_threshold: f32,
    /// Prefix stripped from a robot tag to get its identity suffix.
    pub identity_prefix: String,
    /// Radius of the robot body used for contacts.
    pub body_radius: f32,
    /// Height of the rangefinder above the floor.
    pub sensor_height: f32,
    /// RNG seed for wander headings; 0 draws from entropy.
    pub seed: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            reaim_interval_secs: 1.5,
            min_ball_distance_threshold: 1.5,
            identity_prefix: "Robot".to_string(),
            body_radius: 0.5,
            sensor_height: 0.5,
            seed: 0,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.speed >= 0.0 && self.speed.is_finite()) {
            return Err(RangeScanError::Agent(format!("speed must be >= 0, got {}", self.speed)));
        }
        if !(self.min_ball_distance_threshold >= 0.0) {
            return Err(RangeScanError::Agent(format!(
                "min_ball_distance_threshold must be >= 0, got {}",
                self.min_ball_distance_threshold
            )));
        }
        if !(self.body_radius >= 0.0) {
            return Err(RangeScanError::Agent(format!(
                "body_radius must be >= 0, got {}",
                self.body_radius
            )));
        }
        self.reaim_interval().map(|_| ())
    }

    pub fn reaim_interval(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.reaim_interval_secs) {
            Ok(interval) if !interval.is_zero() => Ok(interval),
            _ => Err(RangeScanError::Agent(format!(
                "reaim_interval_secs must be > 0, got {}",
                self.reaim_interval_secs
            ))),
        }
    }
}

/// Stepping of the simulation harness.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed step length in seconds.
    pub fixed_step_secs: f64,
    /// Total simulated time in seconds.
    pub duration_secs: f64,
    /// Pace steps against the wall clock.
    pub realtime: bool,
    /// Export every n-th depth frame of each robot; 0 disables export.
    pub export_every_nth_frame: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fixed_step_secs: 0.02,
            duration_secs: 60.0,
            realtime: false,
            export_every_nth_frame: 10,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        self.fixed_step().map(|_| ())
    }

    pub fn fixed_step(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.fixed_step_secs) {
            Ok(step) if !step.is_zero() => Ok(step),
            _ => Err(RangeScanError::Config(format!(
                "fixed_step_secs must be > 0, got {}",
                self.fixed_step_secs
            ))),
        }
    }

    /// Number of fixed steps needed to cover `duration_secs`.
    pub fn step_count(&self) -> u64 {
        if self.fixed_step_secs <= 0.0 || self.duration_secs <= 0.0 {
            return 0;
        }
        (self.duration_secs / self.fixed_step_secs).round() as u64
    }
}

/// The walled test arena and its balls.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Walls stand at x = ±half_width.
    pub half_width: f32,
    /// Walls stand at z = ±half_depth.
    pub half_depth: f32,
    pub ball_radius: f32,
    /// Balls placed at random for every robot identity.
    pub random_balls_per_robot: usize,
    /// Seed for random ball placement; 0 draws from entropy.
    pub seed: u64,
    /// Explicitly placed balls.
    pub balls: Vec<BallSpec>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            half_width: 20.0,
            half_depth: 20.0,
            ball_radius: 0.5,
            random_balls_per_robot: 3,
            seed: 0,
            balls: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BallSpec {
    pub tag: String,
    pub x: f32,
    pub z: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RobotSpec {
    pub tag: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub z: f32,
    /// Initial heading around +Y, 0 looks along +Z.
    #[serde(default)]
    pub heading_deg: f32,
}

fn default_robots() -> Vec<RobotSpec> {
    vec![
        RobotSpec {
            tag: "RobotRed".to_string(),
            x: -5.0,
            z: 0.0,
            heading_deg: 0.0,
        },
        RobotSpec {
            tag: "RobotBlue".to_string(),
            x: 5.0,
            z: 0.0,
            heading_deg: 180.0,
        },
    ]
}
