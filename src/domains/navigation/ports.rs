use async_trait::async_trait;

use super::acquisition::{CorrectionValue, MapIdentity, MapLayer, MapRequest};
use super::costmap::OccupancyGrid;
use super::messages::{EmergencyResult, NavigationResult, RobotInfo, RobotStatusReport};
use super::types::{EngineStatus, Pose2D, TurnDirection};
use crate::common::DomainResult;

/// Localization output. Lookups are expected to return quickly or fail.
#[async_trait]
pub trait PoseProvider: Send + Sync {
    async fn current_pose(&self) -> DomainResult<Pose2D>;

    /// Seeds localization with a pose and its 6x6 row-major covariance.
    async fn set_initial_pose(&self, pose: Pose2D, covariance: &[f64]) -> DomainResult<()>;
}

#[async_trait]
pub trait MotionDriver: Send + Sync {
    async fn turn(&self, direction: TurnDirection, speed: f64) -> DomainResult<()>;
    async fn stop_motion(&self) -> DomainResult<()>;
}

/// External planner and path follower.
#[async_trait]
pub trait NavigationEngine: Send + Sync {
    async fn send_goal(&self, goal: Pose2D) -> DomainResult<()>;
    async fn cancel_goal(&self) -> DomainResult<()>;
    /// `None` until the engine has reported on any goal.
    async fn status(&self) -> DomainResult<Option<EngineStatus>>;
}

#[async_trait]
pub trait MapService: Send + Sync {
    async fn fetch_layer(&self, request: &MapRequest) -> DomainResult<MapLayer>;
    async fn fetch_correction(&self, source: &MapIdentity, target: &MapIdentity) -> DomainResult<CorrectionValue>;
    async fn fetch_position(&self) -> DomainResult<Pose2D>;
}

/// Outbound messages. Failures are logged by the caller, never retried.
#[async_trait]
pub trait CoordinatorPublisher: Send + Sync {
    async fn navigation_result(&self, result: &NavigationResult) -> DomainResult<()>;
    async fn emergency_result(&self, result: &EmergencyResult) -> DomainResult<()>;
    async fn status(&self, report: &RobotStatusReport) -> DomainResult<()>;
    async fn costmap(&self, grid: &OccupancyGrid) -> DomainResult<()>;
    async fn robot_info(&self, info: &RobotInfo) -> DomainResult<()>;
}
