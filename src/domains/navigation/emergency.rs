use chrono::Utc;
use tracing::warn;

use super::coordinator::{NavigationCoordinator, DURING_CALIBRATION};
use super::events::CoordinatorEvent;
use super::messages::{EmergencyCommand, EmergencyResult};
use super::types::{CommandResult, EmergencyCommandKind, Mode};
use crate::common::wire_timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyDecision {
    Stop,
    Suspend,
    Resume,
    Reject(&'static str),
    Ignore(String),
}

/// Which override applies to `cmd` in the given mode.
pub fn decide(cmd: &str, mode: Mode, calibrating: bool) -> EmergencyDecision {
    match EmergencyCommandKind::parse(cmd) {
        Some(EmergencyCommandKind::Stop) if calibrating => EmergencyDecision::Reject(DURING_CALIBRATION),
        Some(EmergencyCommandKind::Stop) => EmergencyDecision::Stop,
        Some(EmergencyCommandKind::Suspend) if mode == Mode::Navi => EmergencyDecision::Suspend,
        Some(EmergencyCommandKind::Resume) if mode == Mode::Suspend => EmergencyDecision::Resume,
        Some(_) => EmergencyDecision::Ignore(format!("'{}' is not valid in {} mode", cmd, mode)),
        None => EmergencyDecision::Ignore(format!("Invalid emergency command '{}'", cmd)),
    }
}

impl NavigationCoordinator {
    pub async fn handle_emergency_command(&mut self, cmd: EmergencyCommand) -> EmergencyResult {
        let (result, errors) = match decide(&cmd.cmd, self.state.mode, self.state.calibrating) {
            EmergencyDecision::Stop => {
                self.emergency_stop().await;
                (CommandResult::Ack, Vec::new())
            }
            EmergencyDecision::Suspend => {
                self.suspend_navigation().await;
                (CommandResult::Ack, Vec::new())
            }
            EmergencyDecision::Resume => {
                self.resume_navigation().await;
                (CommandResult::Ack, Vec::new())
            }
            EmergencyDecision::Reject(reason) => {
                self.logger.warn(&format!("Emergency '{}' rejected: {}", cmd.cmd, reason));
                (CommandResult::Error, vec![reason.to_string()])
            }
            EmergencyDecision::Ignore(reason) => {
                self.logger.warn(&reason);
                (CommandResult::Ignore, Vec::new())
            }
        };

        self.record(CoordinatorEvent::CommandHandled {
            entity_id: self.state.entity_id.clone(),
            channel: "emergency".to_string(),
            cmd: cmd.cmd.clone(),
            result,
            errors: errors.clone(),
            timestamp: Utc::now(),
        });

        let response = EmergencyResult {
            id: self.state.entity_id.clone(),
            entity_type: self.config.robot.entity_type.clone(),
            time: wire_timestamp(),
            received_time: cmd.time,
            received_emergency_cmd: cmd.cmd,
            result,
            errors,
        };
        if let Err(e) = self.ports.publisher.emergency_result(&response).await {
            warn!("Failed to publish emergency result: {}", e);
        }
        response
    }

    async fn emergency_stop(&mut self) {
        let was_navigating = matches!(self.state.mode, Mode::Navi | Mode::Suspend);
        self.logger.warn("Emergency stop");
        self.halt_navigation(was_navigating).await;
    }

    async fn suspend_navigation(&mut self) {
        self.logger.info("Suspending navigation");
        self.cancel_goal_and_stop().await;
        if self.state.destination_update_enabled {
            if let Some(current) = self.state.current_destination {
                self.state.queue.push_front(current);
            }
        }
        self.arrival.reset();
        self.stuck.stop();
        self.cancel_rotation();
        self.pending = None;
        self.state.goal_in_flight = false;
        self.set_mode(Mode::Suspend);
    }

    async fn resume_navigation(&mut self) {
        self.logger.info("Resuming navigation");
        self.set_mode(Mode::Navi);
        self.state.navi_active = true;
        self.advance_to_next_waypoint().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_allowed_everywhere_but_calibration() {
        for mode in [Mode::Standby, Mode::Navi, Mode::Suspend] {
            assert_eq!(decide("stop", mode, false), EmergencyDecision::Stop);
            assert_eq!(decide("stop", mode, true), EmergencyDecision::Reject(DURING_CALIBRATION));
        }
    }

    #[test]
    fn test_suspend_and_resume_are_mode_gated() {
        assert_eq!(decide("suspend", Mode::Navi, false), EmergencyDecision::Suspend);
        assert!(matches!(decide("suspend", Mode::Standby, false), EmergencyDecision::Ignore(_)));
        assert!(matches!(decide("suspend", Mode::Suspend, false), EmergencyDecision::Ignore(_)));
        assert_eq!(decide("resume", Mode::Suspend, false), EmergencyDecision::Resume);
        assert!(matches!(decide("resume", Mode::Navi, false), EmergencyDecision::Ignore(_)));
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        assert_eq!(
            decide("reboot", Mode::Navi, false),
            EmergencyDecision::Ignore("Invalid emergency command 'reboot'".to_string())
        );
    }
}
