use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::coordinator::NavigationCoordinator;
use super::costmap::MapMetadata;
use super::messages::{EmergencyCommand, EmergencyResult, NavigationCommand, NavigationResult, RobotStatusReport};
use super::types::Mode;
use crate::common::{ApplicationError, ApplicationResult, EventEnvelope, EventJournal, EventMetadata};
use crate::config::TimingConfig;

const AGGREGATE_TYPE: &str = "NavigationCoordinator";

/// Everything the coordinator reacts to besides its own timers.
#[derive(Debug)]
pub enum CoordinatorInput {
    Navigation(NavigationCommand),
    Emergency(EmergencyCommand),
    MapMetadata(MapMetadata),
    Battery(f64),
    Covariance(Vec<f64>),
    StatusQuery(oneshot::Sender<(Mode, RobotStatusReport)>),
    NavigationWithReply(NavigationCommand, oneshot::Sender<NavigationResult>),
    EmergencyWithReply(EmergencyCommand, oneshot::Sender<EmergencyResult>),
    Shutdown,
}

/// Cloneable front door to a running coordinator actor.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorInput>,
}

impl CoordinatorHandle {
    pub fn new(sender: mpsc::Sender<CoordinatorInput>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, input: CoordinatorInput) -> ApplicationResult<()> {
        self.sender
            .send(input)
            .await
            .map_err(|e| ApplicationError::ChannelClosed(format!("Failed to send input: {}", e)))
    }

    pub async fn navigate(&self, cmd: NavigationCommand) -> ApplicationResult<NavigationResult> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorInput::NavigationWithReply(cmd, tx)).await?;
        rx.await
            .map_err(|e| ApplicationError::ChannelClosed(format!("No navigation result: {}", e)))
    }

    pub async fn emergency(&self, cmd: EmergencyCommand) -> ApplicationResult<EmergencyResult> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorInput::EmergencyWithReply(cmd, tx)).await?;
        rx.await
            .map_err(|e| ApplicationError::ChannelClosed(format!("No emergency result: {}", e)))
    }

    pub async fn status(&self) -> ApplicationResult<(Mode, RobotStatusReport)> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorInput::StatusQuery(tx)).await?;
        rx.await
            .map_err(|e| ApplicationError::ChannelClosed(format!("No status: {}", e)))
    }

    pub async fn shutdown(&self) -> ApplicationResult<()> {
        self.send(CoordinatorInput::Shutdown).await
    }
}

/// Single dispatch loop: inputs and timers run to completion one at a time.
pub struct CoordinatorActor {
    coordinator: NavigationCoordinator,
    receiver: mpsc::Receiver<CoordinatorInput>,
    timing: TimingConfig,
    journal: Option<Arc<dyn EventJournal>>,
}

impl CoordinatorActor {
    pub fn new(
        coordinator: NavigationCoordinator,
        receiver: mpsc::Receiver<CoordinatorInput>,
        timing: TimingConfig,
        journal: Option<Arc<dyn EventJournal>>,
    ) -> Self {
        Self { coordinator, receiver, timing, journal }
    }

    /// Runs until shutdown or until every handle is dropped, then hands the
    /// coordinator back.
    pub async fn run(mut self) -> NavigationCoordinator {
        let mut status = interval(self.timing.status_interval());
        let mut control = interval(self.timing.control_period());
        let mut maneuver = interval(self.timing.maneuver_period());
        let stuck_period = self.coordinator.stuck_check_interval();
        let mut stuck = interval_at(Instant::now() + stuck_period, stuck_period);
        for timer in [&mut status, &mut control, &mut maneuver, &mut stuck] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
        let mut stuck_generation = self.coordinator.stuck_generation();

        info!("Coordinator actor started for {}", self.coordinator.state().entity_id);
        loop {
            if self.coordinator.stuck_generation() != stuck_generation {
                stuck_generation = self.coordinator.stuck_generation();
                stuck.reset();
            }
            let arrival_deadline = self.coordinator.arrival_deadline();
            let maneuver_active = self.coordinator.maneuver_active();
            let stuck_running = self.coordinator.stuck_detection_running();

            tokio::select! {
                biased;
                input = self.receiver.recv() => match input {
                    None | Some(CoordinatorInput::Shutdown) => break,
                    Some(input) => self.handle_input(input).await,
                },
                _ = async { sleep_until(arrival_deadline.unwrap_or_else(Instant::now)).await }, if arrival_deadline.is_some() => {
                    self.coordinator.on_arrival_timeout().await;
                }
                _ = maneuver.tick(), if maneuver_active => self.coordinator.on_maneuver_tick().await,
                _ = control.tick() => self.coordinator.on_control_tick().await,
                _ = stuck.tick(), if stuck_running => self.coordinator.on_stuck_check().await,
                _ = status.tick() => self.coordinator.on_status_broadcast().await,
            }

            self.flush_events().await;
        }
        self.flush_events().await;
        info!("Coordinator actor stopped");
        self.coordinator
    }

    async fn handle_input(&mut self, input: CoordinatorInput) {
        match input {
            CoordinatorInput::Navigation(cmd) => {
                self.coordinator.handle_navigation_command(cmd).await;
            }
            CoordinatorInput::NavigationWithReply(cmd, reply) => {
                let result = self.coordinator.handle_navigation_command(cmd).await;
                let _ = reply.send(result);
            }
            CoordinatorInput::Emergency(cmd) => {
                self.coordinator.handle_emergency_command(cmd).await;
            }
            CoordinatorInput::EmergencyWithReply(cmd, reply) => {
                let result = self.coordinator.handle_emergency_command(cmd).await;
                let _ = reply.send(result);
            }
            CoordinatorInput::MapMetadata(metadata) => self.coordinator.update_map_metadata(metadata),
            CoordinatorInput::Battery(voltage) => self.coordinator.update_battery(voltage),
            CoordinatorInput::Covariance(covariance) => self.coordinator.update_covariance(covariance),
            CoordinatorInput::StatusQuery(reply) => {
                let report = self.coordinator.status_report().await;
                let _ = reply.send((self.coordinator.mode(), report));
            }
            CoordinatorInput::Shutdown => {}
        }
    }

    async fn flush_events(&mut self) {
        let events = self.coordinator.take_events();
        if events.is_empty() {
            return;
        }
        let Some(journal) = &self.journal else {
            debug!("Dropping {} coordinator events, no journal configured", events.len());
            return;
        };
        let metadata = EventMetadata::from_source(AGGREGATE_TYPE);
        let mut envelopes = Vec::with_capacity(events.len());
        for event in &events {
            match EventEnvelope::new(event, AGGREGATE_TYPE, metadata.clone()) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => warn!("Failed to serialize coordinator event: {}", e),
            }
        }
        let aggregate_id = self.coordinator.state().entity_id.clone();
        if let Err(e) = journal.append(&aggregate_id, envelopes).await {
            warn!("Failed to append coordinator events: {}", e);
        }
    }
}
