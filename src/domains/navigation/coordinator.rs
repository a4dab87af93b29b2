use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::acquisition::{acquire_layer_maps, AcquisitionPolicy, CorrectionValue, LayerMapCache};
use super::arrival::{ArrivalConfig, ArrivalDecision, ArrivalReason, GoalArrivalMonitor};
use super::costmap::{CostMap, CostmapSynchronizer, MapMetadata, OccupancyGrid};
use super::events::{CoordinatorEvent, CostmapKind};
use super::messages::{
    BatteryReport, NavigationCommand, NavigationResult, ReportedMode, ReportedPose, RobotInfo,
    RobotSize, RobotStatusReport,
};
use super::orientation::{bearing, CalibrationSpin, ExclusionZone, HeadingTurn, SpinStep, TurnStep};
use super::ports::{CoordinatorPublisher, MapService, MotionDriver, NavigationEngine, PoseProvider};
use super::stuck::{StuckDetector, StuckDetectorConfig, StuckVerdict};
use super::types::{
    CommandResult, EngineStatus, Mode, NavigationCommandKind, Orientation, Point2D, Pose2D,
    TurnDirection, Waypoint,
};
use super::waypoint_queue::WaypointQueue;
use crate::common::{wire_timestamp, DomainResult};
use crate::config::{Config, SourceKind};
use crate::domains::logger::DynLogger;

pub const DURING_CALIBRATION: &str = "during calibration";
pub const GOAL_UNREACHABLE: &str = "I can not reach the goal";

/// Initial pose covariance: 0.25 m² on x and y, about 15° on yaw.
pub fn default_covariance() -> Vec<f64> {
    let mut covariance = vec![0.0; 36];
    covariance[0] = 0.25;
    covariance[7] = 0.25;
    covariance[35] = 0.06853891945200942;
    covariance
}

/// Collaborators the coordinator drives. Cloned handles, never owned state.
#[derive(Clone)]
pub struct CoordinatorPorts {
    pub pose: Arc<dyn PoseProvider>,
    pub motion: Arc<dyn MotionDriver>,
    pub engine: Arc<dyn NavigationEngine>,
    pub maps: Arc<dyn MapService>,
    pub publisher: Arc<dyn CoordinatorPublisher>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub mode: Mode,
    pub entity_id: String,
    pub current_destination: Option<Waypoint>,
    pub active_costmap: Option<CostMap>,
    pub map_revision: String,
    pub queue: WaypointQueue,
    pub is_original_costmap_active: bool,
    /// A navigation session has been started and not finished.
    pub navi_active: bool,
    /// The current destination accepts in-place cost-map updates.
    pub destination_update_enabled: bool,
    /// The engine is working on `current_destination`.
    pub goal_in_flight: bool,
    pub calibrating: bool,
    pub status_enabled: bool,
    pub known_map: Option<MapMetadata>,
    pub last_engine_status: Option<EngineStatus>,
    pub battery_voltage: Option<f64>,
    pub covariance: Vec<f64>,
    pub map_correction: Option<CorrectionValue>,
}

impl CoordinatorState {
    fn new(entity_id: &str) -> Self {
        Self {
            mode: Mode::Standby,
            entity_id: entity_id.to_string(),
            current_destination: None,
            active_costmap: None,
            map_revision: String::new(),
            queue: WaypointQueue::new(),
            is_original_costmap_active: false,
            navi_active: false,
            destination_update_enabled: false,
            goal_in_flight: false,
            calibrating: true,
            status_enabled: false,
            known_map: None,
            last_engine_status: None,
            battery_voltage: None,
            covariance: default_covariance(),
            map_correction: None,
        }
    }
}

/// Rotation in progress, advanced once per maneuver tick.
#[derive(Debug, Clone)]
pub enum Maneuver {
    Idle,
    Calibrating(CalibrationSpin),
    PreRotation(HeadingTurn),
    FinalRotation(HeadingTurn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    DispatchNext,
    ResendCurrent,
}

/// Work deferred until the published cost-map settled or a waypoint pause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: PendingKind,
    pub ready_at: Instant,
}

pub struct NavigationCoordinator {
    pub(super) state: CoordinatorState,
    pub(super) config: Config,
    pub(super) ports: CoordinatorPorts,
    pub(super) logger: DynLogger,
    synchronizer: CostmapSynchronizer,
    pub(super) stuck: StuckDetector,
    pub(super) arrival: GoalArrivalMonitor,
    exclusion_zone: Option<ExclusionZone>,
    layer_cache: LayerMapCache,
    pub(super) maneuver: Maneuver,
    pub(super) pending: Option<PendingAction>,
    uncommitted_events: Vec<CoordinatorEvent>,
}

impl NavigationCoordinator {
    pub fn new(config: &Config, ports: CoordinatorPorts, logger: DynLogger) -> Self {
        let stuck = StuckDetector::new(StuckDetectorConfig {
            check_interval: config.stuck.check_interval(),
            threshold_length: config.stuck.threshold_length,
        });
        let arrival = GoalArrivalMonitor::new(ArrivalConfig {
            tolerance_range: config.navigation.goal_tolerance_range,
            allowable_range: config.navigation.goal_allowable_range,
            timeout: config.navigation.goal_allowable_time(),
        });
        Self {
            state: CoordinatorState::new(&config.robot.entity_id),
            config: config.clone(),
            ports,
            logger,
            synchronizer: CostmapSynchronizer::new(),
            stuck,
            arrival,
            exclusion_zone: ExclusionZone::from_points(&config.navigation.turn_exclusion_zone),
            layer_cache: LayerMapCache::default(),
            maneuver: Maneuver::Idle,
            pending: None,
            uncommitted_events: Vec::new(),
        }
    }

    // Read access

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn maneuver(&self) -> &Maneuver {
        &self.maneuver
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn maneuver_active(&self) -> bool {
        !matches!(self.maneuver, Maneuver::Idle)
    }

    pub fn last_sampled_position(&self) -> Option<Point2D> {
        self.stuck.last_sampled_position()
    }

    pub fn stuck_detection_running(&self) -> bool {
        self.stuck.is_running()
    }

    pub fn stuck_generation(&self) -> u64 {
        self.stuck.generation()
    }

    pub fn stuck_check_interval(&self) -> Duration {
        self.stuck.check_interval()
    }

    pub fn arrival_deadline(&self) -> Option<Instant> {
        if self.state.goal_in_flight {
            self.arrival.deadline()
        } else {
            None
        }
    }

    pub fn layer_cache(&self) -> &LayerMapCache {
        &self.layer_cache
    }

    // Events

    pub fn uncommitted_events(&self) -> &[CoordinatorEvent] {
        &self.uncommitted_events
    }

    pub fn mark_events_as_committed(&mut self) {
        self.uncommitted_events.clear();
    }

    pub fn take_events(&mut self) -> Vec<CoordinatorEvent> {
        std::mem::take(&mut self.uncommitted_events)
    }

    pub(super) fn record(&mut self, event: CoordinatorEvent) {
        self.uncommitted_events.push(event);
    }

    // Telemetry inputs

    pub fn update_map_metadata(&mut self, metadata: MapMetadata) {
        debug!("Known map updated: {}x{} @ {}", metadata.width, metadata.height, metadata.resolution);
        self.state.known_map = Some(metadata);
    }

    pub fn update_battery(&mut self, voltage: f64) {
        self.state.battery_voltage = Some(voltage);
    }

    pub fn update_covariance(&mut self, covariance: Vec<f64>) {
        if covariance.len() != 36 {
            warn!("Ignoring covariance with {} elements", covariance.len());
            return;
        }
        self.state.covariance = covariance;
    }

    // Navigation commands

    pub async fn handle_navigation_command(&mut self, cmd: NavigationCommand) -> NavigationResult {
        info!(
            "Navigation command '{}' (revision '{}') in {} mode",
            cmd.cmd, cmd.revision, self.state.mode
        );
        self.refresh_revision(&cmd.revision).await;

        let kind = NavigationCommandKind::parse(&cmd.cmd);
        let (result, errors) = match (self.state.mode, kind) {
            (Mode::Standby, Some(NavigationCommandKind::Navi)) => self.start_navigation(&cmd).await,
            (Mode::Navi | Mode::Suspend, Some(NavigationCommandKind::Navi)) => {
                self.update_navigation(&cmd).await
            }
            (Mode::Navi | Mode::Suspend, Some(NavigationCommandKind::Refresh)) => {
                self.refresh_navigation(&cmd).await
            }
            (Mode::Navi | Mode::Suspend, Some(NavigationCommandKind::Standby)) => {
                self.halt_navigation(true).await;
                (CommandResult::Ack, Vec::new())
            }
            (mode, _) => {
                self.logger
                    .info(&format!("Ignoring navigation command '{}' in {} mode", cmd.cmd, mode));
                (CommandResult::Ignore, Vec::new())
            }
        };

        self.record(CoordinatorEvent::CommandHandled {
            entity_id: self.state.entity_id.clone(),
            channel: "navigation".to_string(),
            cmd: cmd.cmd.clone(),
            result,
            errors: errors.clone(),
            timestamp: Utc::now(),
        });

        let response = NavigationResult {
            id: self.state.entity_id.clone(),
            entity_type: self.config.robot.entity_type.clone(),
            time: wire_timestamp(),
            received_time: cmd.time,
            received_cmd: cmd.cmd,
            received_revision: cmd.revision,
            received_destination: cmd.destination,
            received_costmap: cmd.costmap,
            result,
            errors,
        };
        if let Err(e) = self.ports.publisher.navigation_result(&response).await {
            warn!("Failed to publish navigation result: {}", e);
        }
        response
    }

    async fn start_navigation(&mut self, cmd: &NavigationCommand) -> (CommandResult, Vec<String>) {
        if self.state.calibrating {
            self.logger.warn("Navigation command rejected during calibration");
            return (CommandResult::Error, vec![DURING_CALIBRATION.to_string()]);
        }
        self.state.queue.clear();
        self.state.queue.push_back(cmd.destination);
        let published = self.apply_costmap(&cmd.costmap).await;
        self.set_mode(Mode::Navi);
        self.state.navi_active = true;
        self.schedule(PendingKind::DispatchNext, self.settle_delay(published));
        (CommandResult::Ack, Vec::new())
    }

    async fn update_navigation(&mut self, cmd: &NavigationCommand) -> (CommandResult, Vec<String>) {
        let same_destination = self
            .state
            .current_destination
            .map(|current| current.same_position(&cmd.destination))
            .unwrap_or(false);
        if !(same_destination && self.state.destination_update_enabled) {
            self.logger.info("Destination does not match the current goal, update ignored");
            return (CommandResult::Ignore, Vec::new());
        }

        match self.synchronizer.check(&cmd.costmap, self.state.known_map.as_ref()) {
            Ok(()) => {
                if self.state.is_original_costmap_active {
                    self.publish_original(&cmd.costmap).await;
                } else {
                    self.publish_deprioritized(&cmd.costmap).await;
                }
                if self.state.mode == Mode::Navi {
                    self.reroute_if_changed(&cmd.costmap).await;
                }
                self.state.active_costmap = Some(cmd.costmap.clone());
            }
            Err(rejection) => {
                self.logger.warn(&rejection.to_string());
                self.stuck.stop();
                self.publish_empty().await;
            }
        }
        (CommandResult::Ack, Vec::new())
    }

    async fn reroute_if_changed(&mut self, costmap: &CostMap) {
        let changed = match &self.state.active_costmap {
            Some(active) => CostmapSynchronizer::diff_count(costmap, active),
            None => costmap.cells.len(),
        };
        debug!("Cost-map update changed {} cells", changed);

        if changed >= self.config.navigation.reroute_threshold && self.state.goal_in_flight {
            self.logger
                .info(&format!("Cost-map changed in {} cells, rerouting to the current goal", changed));
            self.cancel_goal_and_stop().await;
            self.state.queue.clear();
            self.state.goal_in_flight = false;
            self.stuck.stop();
            self.record(CoordinatorEvent::RerouteIssued {
                entity_id: self.state.entity_id.clone(),
                changed_cells: changed,
                timestamp: Utc::now(),
            });
            self.schedule(PendingKind::ResendCurrent, self.config.navigation.costmap_settle());
        } else if self.state.is_original_costmap_active && self.state.goal_in_flight {
            self.stuck.start();
        }
    }

    async fn refresh_navigation(&mut self, cmd: &NavigationCommand) -> (CommandResult, Vec<String>) {
        self.stuck.stop();
        self.cancel_rotation();
        self.arrival.reset();
        self.pending = None;
        self.cancel_goal_and_stop().await;
        self.state.goal_in_flight = false;
        self.state.destination_update_enabled = false;
        self.state.current_destination = None;
        self.state.queue.clear();
        self.state.queue.push_back(cmd.destination);
        self.set_mode(Mode::Navi);
        self.state.navi_active = true;
        let published = self.apply_costmap(&cmd.costmap).await;
        self.schedule(PendingKind::DispatchNext, self.settle_delay(published));
        (CommandResult::Ack, Vec::new())
    }

    /// Ends any navigation session and returns to STANDBY.
    pub(super) async fn halt_navigation(&mut self, publish_empty: bool) {
        self.stuck.stop();
        self.cancel_rotation();
        self.arrival.reset();
        self.pending = None;
        self.cancel_goal_and_stop().await;
        self.state.queue.clear();
        self.state.goal_in_flight = false;
        self.state.destination_update_enabled = false;
        self.state.current_destination = None;
        if publish_empty {
            self.publish_empty().await;
        }
        self.set_mode(Mode::Standby);
        self.state.navi_active = false;
    }

    async fn refresh_revision(&mut self, revision: &str) {
        if revision == self.state.map_revision {
            return;
        }
        info!("Map revision changed '{}' -> '{}'", self.state.map_revision, revision);
        self.state.map_revision = revision.to_string();
        self.layer_cache.mark_stale();

        if self.config.acquisition.navigation_map_source == SourceKind::External {
            let policy = self.acquisition_policy();
            let maps = self.ports.maps.clone();
            match acquire_layer_maps(maps.as_ref(), &mut self.layer_cache, Some(revision), &policy).await {
                Ok(correction) => self.apply_layer_maps(correction),
                Err(e) => self
                    .logger
                    .warn(&format!("Failed to load map from repository: {}", e)),
            }
        }
    }

    pub fn acquisition_policy(&self) -> AcquisitionPolicy {
        let acquisition = &self.config.acquisition;
        AcquisitionPolicy {
            location: acquisition.location.clone(),
            retry_interval: acquisition.retry_interval(),
            map_timeout: acquisition.map_timeout(),
            correction_timeout: acquisition.correction_timeout(),
            pose_timeout: acquisition.pose_timeout(),
        }
    }

    /// Takes the correction and, when the static layer carried a grid
    /// header, adopts it as the known map.
    pub fn apply_layer_maps(&mut self, correction: CorrectionValue) {
        self.state.map_correction = Some(correction);
        if let Some(metadata) = self.layer_cache.static_metadata().cloned() {
            self.update_map_metadata(metadata);
        }
    }

    pub fn layer_cache_mut(&mut self) -> &mut LayerMapCache {
        &mut self.layer_cache
    }

    // Cost-map publication

    /// Publishes the cost-map if it matches the known map, otherwise free space.
    async fn apply_costmap(&mut self, costmap: &CostMap) -> bool {
        match self.synchronizer.check(costmap, self.state.known_map.as_ref()) {
            Ok(()) => {
                self.publish_original(costmap).await;
                self.state.active_costmap = Some(costmap.clone());
                true
            }
            Err(rejection) => {
                self.logger.warn(&rejection.to_string());
                self.state.active_costmap = None;
                self.publish_empty().await;
                false
            }
        }
    }

    async fn publish_original(&mut self, costmap: &CostMap) {
        let grid = self.synchronizer.to_occupancy(costmap, &self.config.robot.map_frame_id);
        self.publish_grid(grid, CostmapKind::Original).await;
        self.state.is_original_costmap_active = true;
    }

    pub(super) async fn publish_empty(&mut self) {
        let metadata = self.state.known_map.clone().unwrap_or_default();
        let grid = OccupancyGrid::free(&self.config.robot.map_frame_id, &metadata);
        self.publish_grid(grid, CostmapKind::Empty).await;
        self.state.is_original_costmap_active = false;
    }

    async fn publish_deprioritized(&mut self, costmap: &CostMap) -> bool {
        let Some(substituted) = self.synchronizer.deprioritize(
            costmap,
            self.config.stuck.obstacle_cost,
            self.config.stuck.avoidance_cost,
        ) else {
            self.logger.error(&format!(
                "Avoidance cost {} has no raw equivalent, cost-map not republished",
                self.config.stuck.avoidance_cost
            ));
            return false;
        };
        let grid = self.synchronizer.to_occupancy(&substituted, &self.config.robot.map_frame_id);
        self.publish_grid(grid, CostmapKind::Deprioritized).await;
        self.state.is_original_costmap_active = false;
        true
    }

    async fn publish_grid(&mut self, grid: OccupancyGrid, kind: CostmapKind) {
        if let Err(e) = self.ports.publisher.costmap(&grid).await {
            warn!("Failed to publish {:?} cost-map: {}", kind, e);
        }
        self.record(CoordinatorEvent::CostmapPublished {
            entity_id: self.state.entity_id.clone(),
            kind,
            cells: grid.cells.len(),
            timestamp: Utc::now(),
        });
    }

    // Goal dispatch

    fn settle_delay(&self, published: bool) -> Duration {
        if published {
            self.config.navigation.costmap_settle()
        } else {
            Duration::ZERO
        }
    }

    fn schedule(&mut self, kind: PendingKind, delay: Duration) {
        self.pending = Some(PendingAction {
            kind,
            ready_at: Instant::now() + delay,
        });
    }

    /// Pops the next waypoint and starts its leg. `false` when the queue is empty.
    async fn dispatch_next(&mut self) -> bool {
        self.arrival.reset();
        self.state.goal_in_flight = false;
        let Some(next) = self.state.queue.pop_front() else {
            return false;
        };
        self.state.current_destination = Some(next);
        self.state.destination_update_enabled = true;

        let pose = self.read_pose().await;
        if let Some(pose) = pose {
            self.stuck.mark_position(pose.position());
        }
        let excluded = match (pose, &self.exclusion_zone) {
            (Some(pose), Some(zone)) => zone.contains(&pose.position()),
            _ => false,
        };
        if excluded {
            info!("Inside the turn exclusion zone, skipping pre-rotation");
            self.send_current_goal(pose).await;
        } else {
            self.maneuver = Maneuver::PreRotation(HeadingTurn::toward(
                next.position,
                self.config.navigation.heading_tolerance(),
                self.config.navigation.max_pose_failures,
            ));
        }
        true
    }

    pub(super) async fn advance_to_next_waypoint(&mut self) {
        if !self.dispatch_next().await && self.state.mode == Mode::Navi {
            self.logger.info("No goal specified, navigation finished");
            self.finish_navigation().await;
        }
    }

    async fn finish_navigation(&mut self) {
        self.stuck.stop();
        self.arrival.reset();
        self.cancel_rotation();
        self.pending = None;
        self.state.goal_in_flight = false;
        self.state.destination_update_enabled = false;
        self.state.current_destination = None;
        self.publish_empty().await;
        self.set_mode(Mode::Standby);
        self.state.navi_active = false;
    }

    async fn send_current_goal(&mut self, pose: Option<Pose2D>) {
        let Some(destination) = self.state.current_destination else {
            return;
        };
        if !(self.state.navi_active && self.state.mode == Mode::Navi) {
            return;
        }
        let yaw = destination
            .required_yaw()
            .or_else(|| pose.map(|p| bearing(p.position(), destination.position)))
            .unwrap_or(0.0);
        let goal = Pose2D::new(destination.position.x, destination.position.y, yaw);

        if !self
            .engine_call("send goal", move |engine| async move { engine.send_goal(goal).await })
            .await
        {
            self.abort_navigation("Navigation engine did not accept the goal").await;
            return;
        }
        info!("Goal sent: ({:.3}, {:.3}, {:.3})", goal.x, goal.y, goal.yaw);
        self.state.goal_in_flight = true;
        self.record(CoordinatorEvent::GoalDispatched {
            entity_id: self.state.entity_id.clone(),
            destination,
            goal,
            timestamp: Utc::now(),
        });
        if self.state.is_original_costmap_active {
            self.stuck.start();
        }
    }

    async fn resend_current_goal(&mut self) {
        if self.maneuver_active() || self.arrival.is_timed_out() {
            return;
        }
        let pose = self.read_pose().await;
        self.send_current_goal(pose).await;
    }

    /// Engine gave up on the goal or could not be reached: hard stop, no retry.
    async fn abort_navigation(&mut self, reason: &str) {
        self.logger.error(reason);
        let destination = self.state.current_destination;
        self.halt_navigation(true).await;
        self.record(CoordinatorEvent::NavigationAborted {
            entity_id: self.state.entity_id.clone(),
            destination,
            timestamp: Utc::now(),
        });
    }

    // Ticks

    pub async fn on_control_tick(&mut self) {
        self.poll_engine_status().await;
        self.run_pending_action().await;
        self.supervise_arrival().await;
    }

    async fn poll_engine_status(&mut self) {
        let limit = self.config.timing.engine_call_timeout();
        match tokio::time::timeout(limit, self.ports.engine.status()).await {
            Ok(Ok(status)) => {
                let previous = self.state.last_engine_status;
                self.state.last_engine_status = status;
                if status == Some(EngineStatus::Aborted)
                    && previous != Some(EngineStatus::Aborted)
                    && self.state.mode == Mode::Navi
                {
                    self.abort_navigation(GOAL_UNREACHABLE).await;
                }
            }
            Ok(Err(e)) => debug!("Engine status unavailable: {}", e),
            Err(_) => debug!("Engine status request timed out"),
        }
    }

    async fn run_pending_action(&mut self) {
        let Some(action) = self.pending else {
            return;
        };
        if Instant::now() < action.ready_at {
            return;
        }
        self.pending = None;
        if !(self.state.mode == Mode::Navi && self.state.navi_active) {
            return;
        }
        match action.kind {
            PendingKind::DispatchNext => self.advance_to_next_waypoint().await,
            PendingKind::ResendCurrent => self.resend_current_goal().await,
        }
    }

    async fn supervise_arrival(&mut self) {
        if !(self.state.mode == Mode::Navi
            && self.state.navi_active
            && self.state.goal_in_flight
            && !self.maneuver_active())
        {
            return;
        }
        let Some(destination) = self.state.current_destination else {
            return;
        };
        let Some(pose) = self.read_pose().await else {
            return;
        };
        let distance = pose.position().distance_to(&destination.position);
        let decision = self
            .arrival
            .observe(distance, self.state.last_engine_status, Instant::now());
        if let ArrivalDecision::Arrived(reason) = decision {
            self.on_waypoint_arrived(destination, reason).await;
        }
    }

    pub async fn on_arrival_timeout(&mut self) {
        if self.arrival.deadline().is_none() {
            return;
        }
        self.arrival.on_timeout();
        info!("Goal allowable time elapsed, cancelling the engine goal");
        self.engine_call("cancel goal", |engine| async move { engine.cancel_goal().await })
            .await;
        self.supervise_arrival().await;
    }

    async fn on_waypoint_arrived(&mut self, destination: Waypoint, reason: ArrivalReason) {
        self.arrival.reset();
        self.stuck.stop();
        self.state.goal_in_flight = false;
        self.logger.info(&format!(
            "Reached waypoint ({:.3}, {:.3}) by {:?}",
            destination.position.x, destination.position.y, reason
        ));
        self.record(CoordinatorEvent::WaypointReached {
            entity_id: self.state.entity_id.clone(),
            destination,
            reason,
            timestamp: Utc::now(),
        });
        match destination.required_yaw() {
            Some(yaw) => {
                self.maneuver = Maneuver::FinalRotation(HeadingTurn::to_yaw(
                    yaw,
                    self.config.navigation.goal_allowable_angle,
                    self.config.navigation.max_pose_failures,
                ));
            }
            None => self.complete_waypoint(false).await,
        }
    }

    /// Pauses before the next leg only when an oriented waypoint still has
    /// waypoints queued behind it. Navigation commands queue a single
    /// destination, so only multi-waypoint queues reach the pause.
    async fn complete_waypoint(&mut self, oriented: bool) {
        self.state.destination_update_enabled = false;
        if oriented && !self.state.queue.is_empty() {
            self.schedule(PendingKind::DispatchNext, self.config.navigation.waypoint_pause());
        } else {
            self.advance_to_next_waypoint().await;
        }
    }

    pub async fn on_maneuver_tick(&mut self) {
        match std::mem::replace(&mut self.maneuver, Maneuver::Idle) {
            Maneuver::Idle => {}
            Maneuver::Calibrating(mut spin) => {
                let yaw = self.read_pose().await.map(|p| p.yaw);
                match spin.step(yaw) {
                    SpinStep::Turn(direction) => {
                        self.drive_turn(direction, self.config.calibration.turn_speed).await;
                        self.maneuver = Maneuver::Calibrating(spin);
                    }
                    SpinStep::Complete { total } => {
                        self.halt_motion().await;
                        self.finish_calibration(true, total).await;
                    }
                    SpinStep::Aborted { total } => {
                        self.halt_motion().await;
                        self.finish_calibration(false, total).await;
                    }
                }
            }
            Maneuver::PreRotation(mut turn) => {
                if !self.rotation_allowed() {
                    self.halt_motion().await;
                    return;
                }
                let pose = self.read_pose().await;
                match turn.step(pose) {
                    TurnStep::Turn { direction, flipped, .. } => {
                        if flipped {
                            debug!("Turn direction flipped to {:?}", direction);
                        }
                        self.drive_turn(direction, self.config.navigation.turn_speed).await;
                        self.maneuver = Maneuver::PreRotation(turn);
                    }
                    TurnStep::Aligned { .. } => {
                        self.halt_motion().await;
                        self.send_current_goal(pose).await;
                    }
                    TurnStep::Wait { failures } => {
                        debug!("Pose unavailable during pre-rotation ({} in a row)", failures);
                        self.maneuver = Maneuver::PreRotation(turn);
                    }
                    TurnStep::Failed { failures } => {
                        self.halt_motion().await;
                        self.logger.warn(&format!(
                            "Turn toward goal abandoned after {} pose failures",
                            failures
                        ));
                        self.send_current_goal(None).await;
                    }
                }
            }
            Maneuver::FinalRotation(mut turn) => {
                if !self.rotation_allowed() {
                    self.halt_motion().await;
                    return;
                }
                let pose = self.read_pose().await;
                match turn.step(pose) {
                    TurnStep::Turn { direction, .. } => {
                        self.drive_turn(direction, self.config.navigation.turn_speed).await;
                        self.maneuver = Maneuver::FinalRotation(turn);
                    }
                    TurnStep::Aligned { .. } => {
                        self.halt_motion().await;
                        self.complete_waypoint(true).await;
                    }
                    TurnStep::Wait { failures } => {
                        debug!("Pose unavailable during final rotation ({} in a row)", failures);
                        self.maneuver = Maneuver::FinalRotation(turn);
                    }
                    TurnStep::Failed { failures } => {
                        self.halt_motion().await;
                        self.logger.warn(&format!(
                            "Final orientation not reached after {} pose failures",
                            failures
                        ));
                        self.complete_waypoint(true).await;
                    }
                }
            }
        }
    }

    fn rotation_allowed(&self) -> bool {
        self.state.navi_active && self.state.mode == Mode::Navi
    }

    /// Drops a heading maneuver. The calibration spin is never cancelled.
    pub(super) fn cancel_rotation(&mut self) {
        if matches!(self.maneuver, Maneuver::PreRotation(_) | Maneuver::FinalRotation(_)) {
            self.maneuver = Maneuver::Idle;
        }
    }

    pub async fn on_stuck_check(&mut self) {
        if !self.stuck.is_running() {
            return;
        }
        let Some(pose) = self.read_pose().await else {
            return;
        };
        match self
            .stuck
            .sample(pose.position(), self.state.is_original_costmap_active)
        {
            StuckVerdict::Stuck { displacement, republish } => {
                self.logger.warn(&format!(
                    "Robot stuck: moved {:.3} m since the last check",
                    displacement
                ));
                let republished = match (republish, self.state.active_costmap.clone()) {
                    (true, Some(active)) => self.publish_deprioritized(&active).await,
                    _ => false,
                };
                self.record(CoordinatorEvent::StuckDetected {
                    entity_id: self.state.entity_id.clone(),
                    displacement,
                    republished,
                    timestamp: Utc::now(),
                });
            }
            StuckVerdict::Moving { displacement } => debug!("Moved {:.3} m since the last check", displacement),
            StuckVerdict::Idle => {}
        }
    }

    // Calibration and reporting

    pub async fn begin_calibration(&mut self) {
        if self.config.calibration.enabled {
            info!("Starting calibration spin");
            self.state.calibrating = true;
            self.maneuver = Maneuver::Calibrating(CalibrationSpin::new(
                self.config.calibration.turn_speed,
                self.config.calibration.noise_floor,
            ));
        } else {
            self.finish_calibration(true, 0.0).await;
        }
    }

    async fn finish_calibration(&mut self, completed: bool, total_rotation: f64) {
        self.state.calibrating = false;
        if completed {
            self.logger.info("Calibration finished");
        } else {
            self.logger.warn(&format!(
                "Calibration aborted after {:.2} rad: pose unavailable",
                total_rotation
            ));
        }
        self.record(CoordinatorEvent::CalibrationFinished {
            entity_id: self.state.entity_id.clone(),
            completed,
            total_rotation,
            timestamp: Utc::now(),
        });
        self.publish_robot_info().await;
        self.state.status_enabled = true;
    }

    pub fn robot_info(&self) -> RobotInfo {
        RobotInfo {
            id: self.state.entity_id.clone(),
            entity_type: self.config.robot.entity_type.clone(),
            time: wire_timestamp(),
            robot_size: RobotSize {
                robot_radius: self.config.robot.robot_radius,
                inflation_radius: self.config.robot.inflation_radius,
                footprint: self.config.robot.footprint.clone(),
            },
        }
    }

    async fn publish_robot_info(&mut self) {
        let info = self.robot_info();
        if let Err(e) = self.ports.publisher.robot_info(&info).await {
            warn!("Failed to publish robot info: {}", e);
        }
    }

    pub async fn status_report(&self) -> RobotStatusReport {
        let pose = self.read_pose().await.map(|p| ReportedPose {
            point: p.position(),
            angle: Orientation::from_yaw(p.yaw),
        });
        let mut errors = Vec::new();
        if self.state.last_engine_status == Some(EngineStatus::Aborted) {
            errors.push(GOAL_UNREACHABLE.to_string());
        }
        let mode = if !errors.is_empty() {
            ReportedMode::Error
        } else {
            match self.state.mode {
                Mode::Standby => ReportedMode::Standby,
                Mode::Navi => ReportedMode::Navi,
                Mode::Suspend => ReportedMode::Suspend,
            }
        };
        RobotStatusReport {
            id: self.state.entity_id.clone(),
            entity_type: self.config.robot.entity_type.clone(),
            time: wire_timestamp(),
            mode,
            pose,
            destination: if self.state.navi_active { self.state.current_destination } else { None },
            covariance: self.state.covariance.clone(),
            battery: BatteryReport {
                voltage: self.state.battery_voltage,
                current_optional: None,
            },
            errors,
        }
    }

    pub async fn on_status_broadcast(&mut self) {
        if !self.state.status_enabled {
            return;
        }
        let report = self.status_report().await;
        if let Err(e) = self.ports.publisher.status(&report).await {
            warn!("Failed to publish status: {}", e);
        }
    }

    // Collaborator plumbing

    pub(super) fn set_mode(&mut self, to: Mode) {
        let from = self.state.mode;
        if from == to {
            return;
        }
        self.state.mode = to;
        self.logger.info(&format!("Mode {} -> {}", from, to));
        self.record(CoordinatorEvent::ModeChanged {
            entity_id: self.state.entity_id.clone(),
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    async fn read_pose(&self) -> Option<Pose2D> {
        match self.ports.pose.current_pose().await {
            Ok(pose) => Some(pose),
            Err(e) => {
                debug!("Pose lookup failed: {}", e);
                None
            }
        }
    }

    async fn drive_turn(&self, direction: TurnDirection, speed: f64) {
        if let Err(e) = self.ports.motion.turn(direction, speed).await {
            warn!("Turn command failed: {}", e);
        }
    }

    async fn halt_motion(&self) {
        if let Err(e) = self.ports.motion.stop_motion().await {
            warn!("Stop command failed: {}", e);
        }
    }

    pub(super) async fn cancel_goal_and_stop(&mut self) {
        self.engine_call("cancel goal", |engine| async move { engine.cancel_goal().await })
            .await;
        self.halt_motion().await;
    }

    /// Bounded, retried engine request. Returns whether any attempt succeeded.
    async fn engine_call<F, Fut>(&self, what: &str, mut call: F) -> bool
    where
        F: FnMut(Arc<dyn NavigationEngine>) -> Fut,
        Fut: Future<Output = DomainResult<()>>,
    {
        let attempts = self.config.timing.engine_call_attempts.max(1);
        let limit = self.config.timing.engine_call_timeout();
        for attempt in 1..=attempts {
            match tokio::time::timeout(limit, call(self.ports.engine.clone())).await {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e),
                Err(_) => warn!("{} timed out (attempt {}/{})", what, attempt, attempts),
            }
        }
        self.logger
            .error(&format!("Navigation engine unavailable: {} failed {} times", what, attempts));
        false
    }
}
