use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::common::EventJournal;
use crate::config::{Config, SourceKind};
use crate::domains::logger::DynLogger;
use crate::domains::navigation::acquisition::{acquire_initial_pose, acquire_layer_maps, AcquisitionPolicy};
use crate::domains::navigation::actors::{CoordinatorActor, CoordinatorHandle};
use crate::domains::navigation::coordinator::{default_covariance, CoordinatorPorts, NavigationCoordinator};
use crate::domains::navigation::types::Pose2D;

const INPUT_CHANNEL_CAPACITY: usize = 100;

/// Builds the coordinator, runs the startup sequence and spawns the actor.
pub struct NavigationService {
    config: Config,
    ports: CoordinatorPorts,
    logger: DynLogger,
    journal: Option<Arc<dyn EventJournal>>,
}

impl NavigationService {
    pub fn new(config: Config, ports: CoordinatorPorts, logger: DynLogger) -> Self {
        Self { config, ports, logger, journal: None }
    }

    pub fn with_journal(mut self, journal: Arc<dyn EventJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Initial map, initial pose, settle, then calibration. Every step is
    /// bounded and degrades to defaults instead of failing startup.
    pub async fn bootstrap(&self) -> NavigationCoordinator {
        let mut coordinator = NavigationCoordinator::new(&self.config, self.ports.clone(), self.logger.clone());
        let policy = coordinator.acquisition_policy();

        if self.config.acquisition.initial_map_source == SourceKind::External {
            let maps = self.ports.maps.clone();
            match acquire_layer_maps(maps.as_ref(), coordinator.layer_cache_mut(), None, &policy).await {
                Ok(correction) => coordinator.apply_layer_maps(correction),
                Err(e) => self.logger.warn(&format!("Failed to load initial map: {}", e)),
            }
        }

        let pose = self.initial_pose(&policy).await;
        if let Err(e) = self.ports.pose.set_initial_pose(pose, &default_covariance()).await {
            self.logger.error(&format!("Failed to set initial pose: {}", e));
        }

        let settle = self.config.calibration.settle();
        if !settle.is_zero() {
            info!("Waiting {:?} for localization to settle", settle);
            tokio::time::sleep(settle).await;
        }
        coordinator.begin_calibration().await;
        coordinator
    }

    async fn initial_pose(&self, policy: &AcquisitionPolicy) -> Pose2D {
        if self.config.acquisition.initial_position_source == SourceKind::External {
            match acquire_initial_pose(self.ports.maps.as_ref(), policy).await {
                Ok(pose) => {
                    info!("Initial pose from map service: ({:.2}, {:.2}, {:.2})", pose.x, pose.y, pose.yaw);
                    return pose;
                }
                Err(e) => warn!("Failed to fetch initial pose, using configured pose: {}", e),
            }
        }
        self.config.robot.initial_pose
    }

    /// Spawns the actor loop for an already bootstrapped coordinator.
    pub fn spawn(&self, coordinator: NavigationCoordinator) -> (CoordinatorHandle, JoinHandle<NavigationCoordinator>) {
        let (sender, receiver) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let actor = CoordinatorActor::new(coordinator, receiver, self.config.timing.clone(), self.journal.clone());
        let task = tokio::spawn(actor.run());
        (CoordinatorHandle::new(sender), task)
    }

    pub async fn start(&self) -> (CoordinatorHandle, JoinHandle<NavigationCoordinator>) {
        let coordinator = self.bootstrap().await;
        self.spawn(coordinator)
    }
}
