use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domains::navigation::types::{Point2D, Pose2D};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub robot: RobotConfig,
    pub navigation: NavigationConfig,
    pub stuck: StuckConfig,
    pub calibration: CalibrationConfig,
    pub acquisition: AcquisitionConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub entity_id: String,
    pub entity_type: String,
    pub map_frame_id: String,
    pub robot_radius: f64,
    pub inflation_radius: f64,
    pub footprint: Vec<Point2D>,
    pub initial_pose: Pose2D,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Strict arrival distance (m)
    pub goal_tolerance_range: f64,
    /// Radius at which the arrival timeout is armed (m)
    pub goal_allowable_range: f64,
    pub goal_allowable_time_secs: f64,
    /// Final orientation tolerance (rad)
    pub goal_allowable_angle: f64,
    pub waypoint_pause_secs: f64,
    /// In-place rotation speed (rad/s)
    pub turn_speed: f64,
    pub heading_tolerance_deg: f64,
    pub max_pose_failures: u32,
    /// Changed cells that force a reroute
    pub reroute_threshold: usize,
    pub costmap_settle_secs: f64,
    pub turn_exclusion_zone: Vec<Point2D>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StuckConfig {
    pub check_interval_secs: f64,
    pub threshold_length: f64,
    /// Occupancy value emitted for de-prioritized obstacle cells
    pub avoidance_cost: i8,
    /// Raw obstacle sentinel
    pub obstacle_cost: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    pub turn_speed: f64,
    pub settle_secs: f64,
    pub noise_floor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Internal,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub initial_position_source: SourceKind,
    pub initial_map_source: SourceKind,
    pub navigation_map_source: SourceKind,
    pub location: String,
    /// Root of the filesystem map repository; unset falls back to
    /// `NAVI_MAP_DATA_DIR` and then the default locations.
    pub map_data_dir: Option<PathBuf>,
    pub retry_interval_secs: f64,
    pub pose_timeout_secs: f64,
    pub correction_timeout_secs: f64,
    pub map_timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub status_interval_secs: f64,
    pub control_rate_hz: f64,
    pub maneuver_rate_hz: f64,
    pub engine_call_timeout_secs: f64,
    pub engine_call_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub domain_log_file: Option<String>,
    pub event_journal_dir: Option<String>,
}

impl Config {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make a timer or a threshold meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.timing.control_rate_hz <= 0.0 || self.timing.maneuver_rate_hz <= 0.0 {
            bail!("control and maneuver rates must be positive");
        }
        if self.timing.status_interval_secs <= 0.0 || self.stuck.check_interval_secs <= 0.0 {
            bail!("status and stuck intervals must be positive");
        }
        if self.timing.engine_call_attempts == 0 {
            bail!("engine_call_attempts must be at least 1");
        }
        if self.navigation.goal_tolerance_range > self.navigation.goal_allowable_range {
            bail!(
                "goal_tolerance_range ({}) exceeds goal_allowable_range ({})",
                self.navigation.goal_tolerance_range,
                self.navigation.goal_allowable_range
            );
        }
        Ok(())
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

fn period(rate_hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rate_hz)
}

impl NavigationConfig {
    pub fn goal_allowable_time(&self) -> Duration { secs(self.goal_allowable_time_secs) }
    pub fn waypoint_pause(&self) -> Duration { secs(self.waypoint_pause_secs) }
    pub fn costmap_settle(&self) -> Duration { secs(self.costmap_settle_secs) }
    pub fn heading_tolerance(&self) -> f64 { self.heading_tolerance_deg.to_radians() }
}

impl StuckConfig {
    pub fn check_interval(&self) -> Duration { secs(self.check_interval_secs) }
}

impl CalibrationConfig {
    pub fn settle(&self) -> Duration { secs(self.settle_secs) }
}

impl AcquisitionConfig {
    pub fn retry_interval(&self) -> Duration { secs(self.retry_interval_secs) }
    pub fn pose_timeout(&self) -> Duration { secs(self.pose_timeout_secs) }
    pub fn correction_timeout(&self) -> Duration { secs(self.correction_timeout_secs) }
    pub fn map_timeout(&self) -> Duration { secs(self.map_timeout_secs) }
}

impl TimingConfig {
    pub fn status_interval(&self) -> Duration { secs(self.status_interval_secs) }
    pub fn control_period(&self) -> Duration { period(self.control_rate_hz) }
    pub fn maneuver_period(&self) -> Duration { period(self.maneuver_rate_hz) }
    pub fn engine_call_timeout(&self) -> Duration { secs(self.engine_call_timeout_secs) }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            entity_id: "turtlebot_01".to_string(),
            entity_type: "turtlebot".to_string(),
            map_frame_id: "map".to_string(),
            robot_radius: 0.3,
            inflation_radius: 0.4,
            footprint: vec![
                Point2D::new(-0.205, -0.155),
                Point2D::new(-0.205, 0.155),
                Point2D::new(0.077, 0.0155),
                Point2D::new(0.077, -0.0155),
            ],
            initial_pose: Pose2D::new(0.0, 0.0, 0.0),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            goal_tolerance_range: 0.05,
            goal_allowable_range: 0.20,
            goal_allowable_time_secs: 4.0,
            goal_allowable_angle: 0.0349066,
            waypoint_pause_secs: 5.0,
            turn_speed: 0.4,
            heading_tolerance_deg: 3.0,
            max_pose_failures: 10,
            reroute_threshold: 30,
            costmap_settle_secs: 5.0,
            turn_exclusion_zone: Vec::new(),
        }
    }
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10.0,
            threshold_length: 0.1,
            avoidance_cost: 51,
            obstacle_cost: 254,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            turn_speed: 0.4,
            settle_secs: 10.0,
            noise_floor: 1e-2,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            initial_position_source: SourceKind::Internal,
            initial_map_source: SourceKind::Internal,
            navigation_map_source: SourceKind::Internal,
            location: "lictia_1f".to_string(),
            map_data_dir: None,
            retry_interval_secs: 5.0,
            pose_timeout_secs: 5.0,
            correction_timeout_secs: 5.0,
            map_timeout_secs: 60.0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 1.0,
            control_rate_hz: 10.0,
            maneuver_rate_hz: 30.0,
            engine_call_timeout_secs: 5.0,
            engine_call_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [robot]
            entity_id = "megarover_07"

            [stuck]
            threshold_length = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.robot.entity_id, "megarover_07");
        assert_eq!(config.robot.entity_type, "turtlebot");
        assert_eq!(config.robot.footprint.len(), 4);
        assert_eq!(config.stuck.threshold_length, 0.25);
        assert_eq!(config.stuck.avoidance_cost, 51);
        assert_eq!(config.navigation.reroute_threshold, 30);
        assert_eq!(config.acquisition.map_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sources_parse_lowercase() {
        let config: Config = toml::from_str(
            r#"
            [acquisition]
            navigation_map_source = "external"
            "#,
        )
        .unwrap();
        assert_eq!(config.acquisition.navigation_map_source, SourceKind::External);
        assert_eq!(config.acquisition.initial_map_source, SourceKind::Internal);
    }

    #[test]
    fn test_map_data_dir_is_optional() {
        assert_eq!(Config::default().acquisition.map_data_dir, None);
        let config: Config = toml::from_str(
            r#"
            [acquisition]
            map_data_dir = "/srv/maps"
            "#,
        )
        .unwrap();
        assert_eq!(config.acquisition.map_data_dir, Some(PathBuf::from("/srv/maps")));
    }

    #[test]
    fn test_validate_rejects_inverted_ranges() {
        let mut config = Config::default();
        config.navigation.goal_tolerance_range = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_periods_follow_rates() {
        let timing = TimingConfig::default();
        assert_eq!(timing.control_period(), Duration::from_millis(100));
        assert_eq!(timing.status_interval(), Duration::from_secs(1));
    }
}
