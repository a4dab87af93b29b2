use serde::{Deserialize, Serialize};

use super::costmap::CostMap;
use super::types::{CommandResult, Orientation, Point2D, Waypoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationCommand {
    pub id: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    pub time: String,
    #[serde(default)]
    pub revision: String,
    pub cmd: String,
    pub destination: Waypoint,
    #[serde(default)]
    pub costmap: CostMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationResult {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub time: String,
    pub received_time: String,
    pub received_cmd: String,
    pub received_revision: String,
    pub received_destination: Waypoint,
    pub received_costmap: CostMap,
    pub result: CommandResult,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyCommand {
    pub id: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    pub time: String,
    #[serde(rename = "emergency_cmd", alias = "cmd")]
    pub cmd: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyResult {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub time: String,
    pub received_time: String,
    pub received_emergency_cmd: String,
    pub result: CommandResult,
    pub errors: Vec<String>,
}

/// Mode as reported; `Error` is a reporting flag, never a stored mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedMode {
    Standby,
    Navi,
    Suspend,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedPose {
    pub point: Point2D,
    pub angle: Orientation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryReport {
    pub voltage: Option<f64>,
    pub current_optional: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatusReport {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub time: String,
    pub mode: ReportedMode,
    pub pose: Option<ReportedPose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Waypoint>,
    pub covariance: Vec<f64>,
    pub battery: BatteryReport,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSize {
    pub robot_radius: f64,
    pub inflation_radius: f64,
    pub footprint: Vec<Point2D>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub time: String,
    pub robot_size: RobotSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_command_accepts_minimal_json() {
        let cmd: NavigationCommand = serde_json::from_str(
            r#"{"id":"turtlebot_01","time":"2024-03-01T12:00:00.000+0900","cmd":"standby",
                "destination":{"position":{"x":1.0,"y":2.0}}}"#,
        )
        .unwrap();
        assert_eq!(cmd.cmd, "standby");
        assert!(cmd.costmap.is_empty());
        assert_eq!(cmd.destination.orientation, None);
    }

    #[test]
    fn test_emergency_command_wire_name() {
        let cmd: EmergencyCommand =
            serde_json::from_str(r#"{"id":"r","type":"t","time":"now","emergency_cmd":"stop"}"#).unwrap();
        assert_eq!(cmd.cmd, "stop");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["emergency_cmd"], "stop");
    }

    #[test]
    fn test_status_report_omits_destination_when_idle() {
        let report = RobotStatusReport {
            id: "r".into(),
            entity_type: "t".into(),
            time: "now".into(),
            mode: ReportedMode::Error,
            pose: None,
            destination: None,
            covariance: vec![0.0; 36],
            battery: BatteryReport { voltage: Some(12.1), current_optional: None },
            errors: vec!["I can not reach the goal".into()],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "error");
        assert!(json.get("destination").is_none());
    }
}
