use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::common::{DomainError, DomainResult};
use crate::domains::navigation::ports::{MotionDriver, NavigationEngine, PoseProvider};
use crate::domains::navigation::types::{normalize_angle, EngineStatus, Pose2D, TurnDirection};

const ARRIVAL_RADIUS: f64 = 0.05;

#[derive(Debug)]
struct SimulationState {
    pose: Pose2D,
    angular_velocity: f64,
    goal: Option<Pose2D>,
    status: Option<EngineStatus>,
    covariance: Vec<f64>,
    last_update: Instant,
}

/// Kinematic stand-in for localization, base motion and the navigation
/// engine. State is integrated lazily whenever a port method is called.
pub struct SimulatedRobot {
    linear_speed: f64,
    state: Mutex<SimulationState>,
}

impl SimulatedRobot {
    pub fn new(initial: Pose2D, linear_speed: f64) -> Self {
        Self {
            linear_speed,
            state: Mutex::new(SimulationState {
                pose: initial,
                angular_velocity: 0.0,
                goal: None,
                status: None,
                covariance: Vec::new(),
                last_update: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> DomainResult<MutexGuard<'_, SimulationState>> {
        self.state
            .lock()
            .map_err(|_| DomainError::InfrastructureError("simulation state poisoned".to_string()))
    }

    /// Advances the state to now and returns the guard.
    fn advance(&self) -> DomainResult<MutexGuard<'_, SimulationState>> {
        let mut state = self.lock()?;
        let now = Instant::now();
        let dt = now.saturating_duration_since(state.last_update).as_secs_f64();
        state.last_update = now;
        if dt <= 0.0 {
            return Ok(state);
        }

        if state.angular_velocity != 0.0 {
            state.pose.yaw = normalize_angle(state.pose.yaw + state.angular_velocity * dt);
        }

        if let (Some(goal), Some(EngineStatus::Active)) = (state.goal, state.status) {
            let dx = goal.x - state.pose.x;
            let dy = goal.y - state.pose.y;
            let remaining = dx.hypot(dy);
            let step = self.linear_speed * dt;
            if remaining - step <= ARRIVAL_RADIUS {
                state.pose = goal;
                state.goal = None;
                state.status = Some(EngineStatus::Succeeded);
                debug!("Simulated robot reached ({:.2}, {:.2})", goal.x, goal.y);
            } else {
                state.pose.x += dx / remaining * step;
                state.pose.y += dy / remaining * step;
                state.pose.yaw = dy.atan2(dx);
            }
        }
        Ok(state)
    }

    pub fn covariance(&self) -> DomainResult<Vec<f64>> {
        Ok(self.lock()?.covariance.clone())
    }
}

#[async_trait]
impl PoseProvider for SimulatedRobot {
    async fn current_pose(&self) -> DomainResult<Pose2D> {
        Ok(self.advance()?.pose)
    }

    async fn set_initial_pose(&self, pose: Pose2D, covariance: &[f64]) -> DomainResult<()> {
        let mut state = self.advance()?;
        state.pose = pose;
        state.covariance = covariance.to_vec();
        Ok(())
    }
}

#[async_trait]
impl MotionDriver for SimulatedRobot {
    async fn turn(&self, direction: TurnDirection, speed: f64) -> DomainResult<()> {
        self.advance()?.angular_velocity = direction.angular_velocity(speed);
        Ok(())
    }

    async fn stop_motion(&self) -> DomainResult<()> {
        self.advance()?.angular_velocity = 0.0;
        Ok(())
    }
}

#[async_trait]
impl NavigationEngine for SimulatedRobot {
    async fn send_goal(&self, goal: Pose2D) -> DomainResult<()> {
        let mut state = self.advance()?;
        state.goal = Some(goal);
        state.status = Some(EngineStatus::Active);
        Ok(())
    }

    async fn cancel_goal(&self) -> DomainResult<()> {
        let mut state = self.advance()?;
        if state.goal.take().is_some() {
            state.status = Some(EngineStatus::Preempted);
        }
        Ok(())
    }

    async fn status(&self) -> DomainResult<Option<EngineStatus>> {
        Ok(self.advance()?.status)
    }
}
