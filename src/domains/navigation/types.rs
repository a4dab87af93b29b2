use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Orientation {
    pub fn from_yaw(yaw: f64) -> Self {
        Self { roll: 0.0, pitch: 0.0, yaw }
    }
}

/// Target position with an optional required final heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Point2D,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl Waypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point2D::new(x, y),
            orientation: None,
        }
    }

    pub fn with_yaw(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            position: Point2D::new(x, y),
            orientation: Some(Orientation::from_yaw(yaw)),
        }
    }

    pub fn required_yaw(&self) -> Option<f64> {
        self.orientation.map(|o| o.yaw)
    }

    /// Position equality within machine epsilon on both axes.
    pub fn same_position(&self, other: &Waypoint) -> bool {
        (self.position.x - other.position.x).abs() <= f64::EPSILON
            && (self.position.y - other.position.y).abs() <= f64::EPSILON
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Standby,
    Navi,
    Suspend,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Standby => "standby",
            Mode::Navi => "navi",
            Mode::Suspend => "suspend",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationCommandKind {
    Navi,
    Refresh,
    Standby,
}

impl NavigationCommandKind {
    pub fn parse(cmd: &str) -> Option<Self> {
        match cmd {
            "navi" => Some(Self::Navi),
            "refresh" => Some(Self::Refresh),
            "standby" => Some(Self::Standby),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyCommandKind {
    Stop,
    Suspend,
    Resume,
}

impl EmergencyCommandKind {
    pub fn parse(cmd: &str) -> Option<Self> {
        match cmd {
            "stop" => Some(Self::Stop),
            "suspend" => Some(Self::Suspend),
            "resume" => Some(Self::Resume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandResult {
    Ack,
    Ignore,
    Error,
}

/// Goal state as reported by the external navigation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Pending,
    Active,
    Preempted,
    Succeeded,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    /// Right turn, yaw decreasing.
    Clockwise,
    /// Left turn, yaw increasing.
    CounterClockwise,
}

impl TurnDirection {
    /// Signed angular velocity for a turn at `speed`.
    pub fn angular_velocity(&self, speed: f64) -> f64 {
        match self {
            TurnDirection::Clockwise => -speed.abs(),
            TurnDirection::CounterClockwise => speed.abs(),
        }
    }
}

pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * std::f64::consts::PI);
    if a > std::f64::consts::PI {
        a -= 2.0 * std::f64::consts::PI;
    } else if a < -std::f64::consts::PI {
        a += 2.0 * std::f64::consts::PI;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_same_position_is_exact() {
        let a = Waypoint::new(5.0, 0.0);
        assert!(a.same_position(&Waypoint::with_yaw(5.0, 0.0, 1.0)));
        assert!(!a.same_position(&Waypoint::new(5.0, 0.001)));
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(NavigationCommandKind::parse("refresh"), Some(NavigationCommandKind::Refresh));
        assert_eq!(NavigationCommandKind::parse("NAVI"), None);
        assert_eq!(EmergencyCommandKind::parse("resume"), Some(EmergencyCommandKind::Resume));
        assert_eq!(EmergencyCommandKind::parse("halt"), None);
    }

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(2.5 * PI) - 0.5 * PI).abs() < 1e-9);
        assert!((normalize_angle(-1.5 * PI) - 0.5 * PI).abs() < 1e-9);
        assert_eq!(normalize_angle(0.3), 0.3);
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Suspend).unwrap(), "\"suspend\"");
        assert_eq!(serde_json::to_string(&CommandResult::Ignore).unwrap(), "\"ignore\"");
    }
}
