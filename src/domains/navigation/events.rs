use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::arrival::ArrivalReason;
use super::types::{CommandResult, Mode, Pose2D, Waypoint};
use crate::common::DomainEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostmapKind {
    Original,
    Deprioritized,
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinatorEvent {
    ModeChanged {
        entity_id: String,
        from: Mode,
        to: Mode,
        timestamp: DateTime<Utc>,
    },
    CommandHandled {
        entity_id: String,
        channel: String,
        cmd: String,
        result: CommandResult,
        errors: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    CostmapPublished {
        entity_id: String,
        kind: CostmapKind,
        cells: usize,
        timestamp: DateTime<Utc>,
    },
    GoalDispatched {
        entity_id: String,
        destination: Waypoint,
        goal: Pose2D,
        timestamp: DateTime<Utc>,
    },
    RerouteIssued {
        entity_id: String,
        changed_cells: usize,
        timestamp: DateTime<Utc>,
    },
    StuckDetected {
        entity_id: String,
        displacement: f64,
        republished: bool,
        timestamp: DateTime<Utc>,
    },
    WaypointReached {
        entity_id: String,
        destination: Waypoint,
        reason: ArrivalReason,
        timestamp: DateTime<Utc>,
    },
    NavigationAborted {
        entity_id: String,
        destination: Option<Waypoint>,
        timestamp: DateTime<Utc>,
    },
    CalibrationFinished {
        entity_id: String,
        completed: bool,
        total_rotation: f64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent for CoordinatorEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CoordinatorEvent::ModeChanged { .. } => "ModeChanged",
            CoordinatorEvent::CommandHandled { .. } => "CommandHandled",
            CoordinatorEvent::CostmapPublished { .. } => "CostmapPublished",
            CoordinatorEvent::GoalDispatched { .. } => "GoalDispatched",
            CoordinatorEvent::RerouteIssued { .. } => "RerouteIssued",
            CoordinatorEvent::StuckDetected { .. } => "StuckDetected",
            CoordinatorEvent::WaypointReached { .. } => "WaypointReached",
            CoordinatorEvent::NavigationAborted { .. } => "NavigationAborted",
            CoordinatorEvent::CalibrationFinished { .. } => "CalibrationFinished",
        }
    }

    fn aggregate_id(&self) -> &str {
        match self {
            CoordinatorEvent::ModeChanged { entity_id, .. } => entity_id,
            CoordinatorEvent::CommandHandled { entity_id, .. } => entity_id,
            CoordinatorEvent::CostmapPublished { entity_id, .. } => entity_id,
            CoordinatorEvent::GoalDispatched { entity_id, .. } => entity_id,
            CoordinatorEvent::RerouteIssued { entity_id, .. } => entity_id,
            CoordinatorEvent::StuckDetected { entity_id, .. } => entity_id,
            CoordinatorEvent::WaypointReached { entity_id, .. } => entity_id,
            CoordinatorEvent::NavigationAborted { entity_id, .. } => entity_id,
            CoordinatorEvent::CalibrationFinished { entity_id, .. } => entity_id,
        }
    }

    fn event_version(&self) -> u64 { 1 }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CoordinatorEvent::ModeChanged { timestamp, .. } => *timestamp,
            CoordinatorEvent::CommandHandled { timestamp, .. } => *timestamp,
            CoordinatorEvent::CostmapPublished { timestamp, .. } => *timestamp,
            CoordinatorEvent::GoalDispatched { timestamp, .. } => *timestamp,
            CoordinatorEvent::RerouteIssued { timestamp, .. } => *timestamp,
            CoordinatorEvent::StuckDetected { timestamp, .. } => *timestamp,
            CoordinatorEvent::WaypointReached { timestamp, .. } => *timestamp,
            CoordinatorEvent::NavigationAborted { timestamp, .. } => *timestamp,
            CoordinatorEvent::CalibrationFinished { timestamp, .. } => *timestamp,
        }
    }
}
