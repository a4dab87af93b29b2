use std::time::Duration;
use tokio::time::Instant;

use super::types::EngineStatus;

#[derive(Debug, Clone, Copy)]
pub struct ArrivalConfig {
    pub tolerance_range: f64,
    pub allowable_range: f64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalReason {
    EngineConfirmed,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrivalDecision {
    EnRoute,
    /// Inside the allowable range with the timeout armed.
    Approaching,
    Arrived(ArrivalReason),
}

/// Decides when the current waypoint counts as reached.
#[derive(Debug, Clone)]
pub struct GoalArrivalMonitor {
    config: ArrivalConfig,
    deadline: Option<Instant>,
    timed_out: bool,
}

impl GoalArrivalMonitor {
    pub fn new(config: ArrivalConfig) -> Self {
        Self {
            config,
            deadline: None,
            timed_out: false,
        }
    }

    pub fn observe(&mut self, distance: f64, status: Option<EngineStatus>, now: Instant) -> ArrivalDecision {
        if distance <= self.config.allowable_range && self.deadline.is_none() {
            self.deadline = Some(now + self.config.timeout);
        }
        if matches!(self.deadline, Some(d) if now >= d) {
            self.timed_out = true;
        }

        let engine_done = matches!(status, Some(EngineStatus::Succeeded) | Some(EngineStatus::Pending));
        if engine_done && distance <= self.config.tolerance_range {
            ArrivalDecision::Arrived(ArrivalReason::EngineConfirmed)
        } else if self.timed_out {
            ArrivalDecision::Arrived(ArrivalReason::Timeout)
        } else if self.deadline.is_some() {
            ArrivalDecision::Approaching
        } else {
            ArrivalDecision::EnRoute
        }
    }

    /// Pending timer expiry, `None` once fired or when not armed.
    pub fn deadline(&self) -> Option<Instant> {
        if self.timed_out {
            None
        } else {
            self.deadline
        }
    }

    pub fn on_timeout(&mut self) {
        if self.deadline.is_some() {
            self.timed_out = true;
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn reset(&mut self) {
        self.deadline = None;
        self.timed_out = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> GoalArrivalMonitor {
        GoalArrivalMonitor::new(ArrivalConfig {
            tolerance_range: 0.05,
            allowable_range: 0.20,
            timeout: Duration::from_secs(4),
        })
    }

    #[test]
    fn test_far_away_is_en_route() {
        let mut m = monitor();
        let now = Instant::now();
        assert_eq!(m.observe(2.0, Some(EngineStatus::Active), now), ArrivalDecision::EnRoute);
        assert_eq!(m.deadline(), None);
    }

    #[test]
    fn test_engine_confirmation_beats_timeout() {
        let mut m = monitor();
        let now = Instant::now();
        assert_eq!(
            m.observe(0.04, Some(EngineStatus::Succeeded), now),
            ArrivalDecision::Arrived(ArrivalReason::EngineConfirmed)
        );
        let mut m = monitor();
        assert_eq!(
            m.observe(0.04, Some(EngineStatus::Pending), now),
            ArrivalDecision::Arrived(ArrivalReason::EngineConfirmed)
        );
    }

    #[test]
    fn test_active_engine_within_tolerance_waits_for_timer() {
        let mut m = monitor();
        let now = Instant::now();
        assert_eq!(m.observe(0.03, Some(EngineStatus::Active), now), ArrivalDecision::Approaching);
        assert_eq!(m.deadline(), Some(now + Duration::from_secs(4)));
    }

    #[test]
    fn test_timeout_declares_arrival_exactly_at_deadline() {
        let mut m = monitor();
        let start = Instant::now();
        assert_eq!(m.observe(0.15, Some(EngineStatus::Active), start), ArrivalDecision::Approaching);
        let almost = start + Duration::from_millis(3999);
        assert_eq!(m.observe(0.15, Some(EngineStatus::Active), almost), ArrivalDecision::Approaching);
        let at = start + Duration::from_secs(4);
        assert_eq!(
            m.observe(0.15, Some(EngineStatus::Active), at),
            ArrivalDecision::Arrived(ArrivalReason::Timeout)
        );
        assert_eq!(m.deadline(), None);
    }

    #[test]
    fn test_timer_is_not_rearmed_when_leaving_range() {
        let mut m = monitor();
        let start = Instant::now();
        m.observe(0.15, None, start);
        m.observe(0.5, None, start + Duration::from_secs(1));
        assert_eq!(m.deadline(), Some(start + Duration::from_secs(4)));
        m.on_timeout();
        assert!(m.is_timed_out());
        m.reset();
        assert!(!m.is_timed_out());
        assert_eq!(m.deadline(), None);
    }
}
