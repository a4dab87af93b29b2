#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use navi_coordinator::adapters::outbound::OutboundMessage;
use navi_coordinator::common::{ApplicationResult, DomainError, DomainResult, EventEnvelope, EventJournal};
use navi_coordinator::config::Config;
use navi_coordinator::domains::logger::{DomainLogger, DynLogger};
use navi_coordinator::domains::navigation::acquisition::{CorrectionValue, MapIdentity, MapLayer, MapLayerKind, MapRequest};
use navi_coordinator::domains::navigation::costmap::{CostMap, MapMetadata, OccupancyGrid};
use navi_coordinator::domains::navigation::messages::{
    EmergencyCommand, EmergencyResult, NavigationCommand, NavigationResult, RobotInfo, RobotStatusReport,
};
use navi_coordinator::domains::navigation::ports::{
    CoordinatorPublisher, MapService, MotionDriver, NavigationEngine, PoseProvider,
};
use navi_coordinator::domains::navigation::types::{EngineStatus, Point2D, Pose2D, TurnDirection, Waypoint};
use navi_coordinator::domains::navigation::{CoordinatorPorts, NavigationCoordinator};

#[derive(Debug, Default)]
struct RobotState {
    pose: Option<Pose2D>,
    status: Option<EngineStatus>,
    fail_send: bool,
    goals: Vec<Pose2D>,
    cancels: usize,
    turns: Vec<TurnDirection>,
    stops: usize,
    initial_poses: Vec<Pose2D>,
}

/// Pose provider, motion driver and engine whose state the test sets directly.
pub struct FakeRobot {
    state: Mutex<RobotState>,
}

impl FakeRobot {
    pub fn at(pose: Pose2D) -> Self {
        Self {
            state: Mutex::new(RobotState {
                pose: Some(pose),
                ..Default::default()
            }),
        }
    }

    pub fn set_pose(&self, pose: Option<Pose2D>) {
        self.state.lock().unwrap().pose = pose;
    }

    pub fn set_status(&self, status: Option<EngineStatus>) {
        self.state.lock().unwrap().status = status;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    pub fn goals(&self) -> Vec<Pose2D> {
        self.state.lock().unwrap().goals.clone()
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().unwrap().cancels
    }

    pub fn turns(&self) -> Vec<TurnDirection> {
        self.state.lock().unwrap().turns.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn initial_poses(&self) -> Vec<Pose2D> {
        self.state.lock().unwrap().initial_poses.clone()
    }
}

#[async_trait]
impl PoseProvider for FakeRobot {
    async fn current_pose(&self) -> DomainResult<Pose2D> {
        self.state.lock().unwrap().pose.ok_or(DomainError::PoseUnavailable {
            reason: "no transform".to_string(),
        })
    }

    async fn set_initial_pose(&self, pose: Pose2D, _covariance: &[f64]) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.initial_poses.push(pose);
        state.pose = Some(pose);
        Ok(())
    }
}

#[async_trait]
impl MotionDriver for FakeRobot {
    async fn turn(&self, direction: TurnDirection, _speed: f64) -> DomainResult<()> {
        self.state.lock().unwrap().turns.push(direction);
        Ok(())
    }

    async fn stop_motion(&self) -> DomainResult<()> {
        self.state.lock().unwrap().stops += 1;
        Ok(())
    }
}

#[async_trait]
impl NavigationEngine for FakeRobot {
    async fn send_goal(&self, goal: Pose2D) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(DomainError::EngineUnavailable {
                reason: "server not available".to_string(),
            });
        }
        state.goals.push(goal);
        state.status = Some(EngineStatus::Active);
        Ok(())
    }

    async fn cancel_goal(&self) -> DomainResult<()> {
        self.state.lock().unwrap().cancels += 1;
        Ok(())
    }

    async fn status(&self) -> DomainResult<Option<EngineStatus>> {
        Ok(self.state.lock().unwrap().status)
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingPublisher {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn costmaps(&self) -> Vec<OccupancyGrid> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Costmap(grid) => Some(grid),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<RobotStatusReport> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::RobotStatus(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    pub fn robot_infos(&self) -> Vec<RobotInfo> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::RobotInfo(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    fn push(&self, message: OutboundMessage) -> DomainResult<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl CoordinatorPublisher for RecordingPublisher {
    async fn navigation_result(&self, result: &NavigationResult) -> DomainResult<()> {
        self.push(OutboundMessage::NaviCmdResult(result.clone()))
    }

    async fn emergency_result(&self, result: &EmergencyResult) -> DomainResult<()> {
        self.push(OutboundMessage::EmergencyResult(result.clone()))
    }

    async fn status(&self, report: &RobotStatusReport) -> DomainResult<()> {
        self.push(OutboundMessage::RobotStatus(report.clone()))
    }

    async fn costmap(&self, grid: &OccupancyGrid) -> DomainResult<()> {
        self.push(OutboundMessage::Costmap(grid.clone()))
    }

    async fn robot_info(&self, info: &RobotInfo) -> DomainResult<()> {
        self.push(OutboundMessage::RobotInfo(info.clone()))
    }
}

/// Map service that serves one revision and counts requests.
pub struct StaticMapService {
    pub revision: String,
    pub position: Option<Pose2D>,
    pub available: bool,
    pub static_metadata: Option<MapMetadata>,
    layer_requests: AtomicUsize,
    correction_sources: Mutex<Vec<MapIdentity>>,
}

impl StaticMapService {
    pub fn new(revision: &str, position: Option<Pose2D>) -> Self {
        Self {
            revision: revision.to_string(),
            position,
            available: true,
            static_metadata: None,
            layer_requests: AtomicUsize::new(0),
            correction_sources: Mutex::new(Vec::new()),
        }
    }

    /// Serves `metadata` as the grid header of the static layer.
    pub fn with_static_metadata(mut self, metadata: MapMetadata) -> Self {
        self.static_metadata = Some(metadata);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new("0", None)
        }
    }

    pub fn layer_requests(&self) -> usize {
        self.layer_requests.load(Ordering::SeqCst)
    }

    pub fn correction_sources(&self) -> Vec<MapIdentity> {
        self.correction_sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl MapService for StaticMapService {
    async fn fetch_layer(&self, request: &MapRequest) -> DomainResult<MapLayer> {
        self.layer_requests.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(DomainError::MapService {
                reason: "map repository offline".to_string(),
            });
        }
        Ok(MapLayer {
            layer: request.layer,
            revision: request.revision.clone().unwrap_or_else(|| self.revision.clone()),
            metadata: match request.layer {
                MapLayerKind::StaticLayer => self.static_metadata.clone(),
                _ => None,
            },
        })
    }

    async fn fetch_correction(&self, source: &MapIdentity, _target: &MapIdentity) -> DomainResult<CorrectionValue> {
        self.correction_sources.lock().unwrap().push(source.clone());
        if !self.available {
            return Err(DomainError::MapService {
                reason: "map repository offline".to_string(),
            });
        }
        Ok(CorrectionValue { dx: 0.5, dy: -0.25, dyaw: 0.0 })
    }

    async fn fetch_position(&self) -> DomainResult<Pose2D> {
        self.position.ok_or(DomainError::MapService {
            reason: "no stored position".to_string(),
        })
    }
}

pub struct CaptureLogger {
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl CaptureLogger {
    pub fn new() -> Self {
        Self { messages: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m.contains(needle))
    }
}

impl DomainLogger for CaptureLogger {
    fn info(&self, msg: &str) { self.messages.lock().unwrap().push(format!("INFO:{}", msg)); }
    fn warn(&self, msg: &str) { self.messages.lock().unwrap().push(format!("WARN:{}", msg)); }
    fn error(&self, msg: &str) { self.messages.lock().unwrap().push(format!("ERR:{}", msg)); }
}

#[derive(Default)]
pub struct MemoryJournal {
    pub events: Mutex<Vec<EventEnvelope>>,
}

#[async_trait]
impl EventJournal for MemoryJournal {
    async fn append(&self, _aggregate_id: &str, events: Vec<EventEnvelope>) -> ApplicationResult<()> {
        self.events.lock().unwrap().extend(events);
        Ok(())
    }

    async fn load(&self, aggregate_id: &str) -> ApplicationResult<Vec<EventEnvelope>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}

pub struct Fixture {
    pub robot: Arc<FakeRobot>,
    pub publisher: Arc<RecordingPublisher>,
    pub maps: Arc<StaticMapService>,
    pub logger: Arc<CaptureLogger>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_maps(StaticMapService::new("1", None))
    }

    pub fn with_maps(maps: StaticMapService) -> Self {
        Self {
            robot: Arc::new(FakeRobot::at(Pose2D::default())),
            publisher: Arc::new(RecordingPublisher::default()),
            maps: Arc::new(maps),
            logger: Arc::new(CaptureLogger::new()),
        }
    }

    pub fn ports(&self) -> CoordinatorPorts {
        CoordinatorPorts {
            pose: self.robot.clone(),
            motion: self.robot.clone(),
            engine: self.robot.clone(),
            maps: self.maps.clone(),
            publisher: self.publisher.clone(),
        }
    }

    pub fn dyn_logger(&self) -> DynLogger {
        self.logger.clone()
    }

    pub fn coordinator(&self, config: &Config) -> NavigationCoordinator {
        NavigationCoordinator::new(config, self.ports(), self.dyn_logger())
    }

    /// Coordinator with calibration already finished and the known map set.
    pub async fn ready_coordinator(&self, config: &Config) -> NavigationCoordinator {
        let mut coordinator = self.coordinator(config);
        coordinator.update_map_metadata(known_map());
        coordinator.begin_calibration().await;
        coordinator.mark_events_as_committed();
        coordinator
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.calibration.enabled = false;
    config.calibration.settle_secs = 0.0;
    config
}

pub fn known_map() -> MapMetadata {
    MapMetadata {
        width: 10,
        height: 10,
        resolution: 0.05,
        origin: Point2D::new(0.0, 0.0),
    }
}

/// Free cost-map over the known map with the first `changed` cells set to `raw`.
pub fn costmap_with(changed: usize, raw: u8) -> CostMap {
    let mut costmap = CostMap::filled(&known_map(), 0);
    for cell in costmap.cells.iter_mut().take(changed) {
        *cell = raw;
    }
    costmap
}

pub fn navi_cmd(cmd: &str, destination: Waypoint, costmap: CostMap) -> NavigationCommand {
    NavigationCommand {
        id: "turtlebot_01".to_string(),
        entity_type: "turtlebot".to_string(),
        time: "2026-10-16T10:00:00.000+0900".to_string(),
        revision: String::new(),
        cmd: cmd.to_string(),
        destination,
        costmap,
    }
}

pub fn emergency_cmd(cmd: &str) -> EmergencyCommand {
    EmergencyCommand {
        id: "turtlebot_01".to_string(),
        entity_type: "turtlebot".to_string(),
        time: "2026-10-16T10:00:01.000+0900".to_string(),
        cmd: cmd.to_string(),
    }
}
