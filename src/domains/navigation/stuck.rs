use std::time::Duration;

use super::types::Point2D;

#[derive(Debug, Clone, Copy)]
pub struct StuckDetectorConfig {
    pub check_interval: Duration,
    pub threshold_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StuckVerdict {
    /// Detector is not sampling on this leg.
    Idle,
    Moving { displacement: f64 },
    /// Detector stopped itself; `republish` asks for a de-prioritized cost-map.
    Stuck { displacement: f64, republish: bool },
}

/// Periodic displacement sampler, at most one trigger per leg.
#[derive(Debug, Clone)]
pub struct StuckDetector {
    config: StuckDetectorConfig,
    running: bool,
    last_sampled: Option<Point2D>,
    generation: u64,
}

impl StuckDetector {
    pub fn new(config: StuckDetectorConfig) -> Self {
        Self {
            config,
            running: false,
            last_sampled: None,
            generation: 0,
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.config.check_interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Bumped on every start so the sampling timer can be re-armed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_sampled_position(&self) -> Option<Point2D> {
        self.last_sampled
    }

    /// Records the leg origin without starting the sampler.
    pub fn mark_position(&mut self, position: Point2D) {
        self.last_sampled = Some(position);
    }

    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            self.generation = self.generation.wrapping_add(1);
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn sample(&mut self, current: Point2D, original_costmap_active: bool) -> StuckVerdict {
        if !self.running {
            return StuckVerdict::Idle;
        }
        let displacement = self
            .last_sampled
            .map(|p| p.distance_to(&current))
            .unwrap_or(f64::INFINITY);
        self.last_sampled = Some(current);

        if displacement - f64::EPSILON <= self.config.threshold_length {
            self.running = false;
            StuckVerdict::Stuck {
                displacement,
                republish: original_costmap_active,
            }
        } else {
            StuckVerdict::Moving { displacement }
        }
    }
}
