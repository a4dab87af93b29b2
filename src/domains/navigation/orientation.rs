//! In-place rotation: shortest-turn math, heading maneuvers and the startup
//! calibration spin.
//!
//! Maneuvers are step machines. The coordinator feeds one pose sample per
//! maneuver tick and forwards the returned turn command to the motion driver,
//! so a mode change cancels a maneuver simply by dropping it.

use std::f64::consts::PI;

use super::types::{normalize_angle, Point2D, Pose2D, TurnDirection};

/// Shortest rotation from `current_yaw` to `target_yaw`.
///
/// Both angles are shifted into `[0, 2π)` and compared; a difference of at
/// most π is turned directly, anything larger the other way round.
pub fn turn_angle(current_yaw: f64, target_yaw: f64) -> (TurnDirection, f64) {
    let current = normalize_angle(current_yaw) + PI;
    let goal = normalize_angle(target_yaw) + PI;

    if current >= goal {
        let diff = current - goal;
        if diff <= PI {
            (TurnDirection::Clockwise, diff)
        } else {
            (TurnDirection::CounterClockwise, 2.0 * PI - diff)
        }
    } else {
        let diff = goal - current;
        if diff <= PI {
            (TurnDirection::CounterClockwise, diff)
        } else {
            (TurnDirection::Clockwise, 2.0 * PI - diff)
        }
    }
}

pub fn bearing(from: Point2D, to: Point2D) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// Axis-aligned rectangle in which pre-rotation is skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExclusionZone {
    min: Point2D,
    max: Point2D,
}

impl ExclusionZone {
    /// Bounding box of `corners`; `None` for an empty list.
    pub fn from_points(corners: &[Point2D]) -> Option<Self> {
        let first = corners.first()?;
        let (min, max) = corners.iter().fold((*first, *first), |(lo, hi), p| {
            (
                Point2D::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point2D::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        });
        Some(Self { min, max })
    }

    pub fn contains(&self, p: &Point2D) -> bool {
        p.x >= self.min.x - f64::EPSILON
            && p.x <= self.max.x + f64::EPSILON
            && p.y >= self.min.y - f64::EPSILON
            && p.y <= self.max.y + f64::EPSILON
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingTarget {
    /// Face a point, re-evaluating the bearing every step.
    Toward(Point2D),
    Yaw(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnStep {
    Turn {
        direction: TurnDirection,
        remaining: f64,
        flipped: bool,
    },
    Aligned {
        yaw: f64,
    },
    /// Pose read failed; no turn is issued this step.
    Wait {
        failures: u32,
    },
    Failed {
        failures: u32,
    },
}

#[derive(Debug, Clone)]
pub struct HeadingTurn {
    target: HeadingTarget,
    tolerance: f64,
    max_pose_failures: u32,
    direction: Option<TurnDirection>,
    consecutive_failures: u32,
}

impl HeadingTurn {
    pub fn toward(goal: Point2D, tolerance: f64, max_pose_failures: u32) -> Self {
        Self::new(HeadingTarget::Toward(goal), tolerance, max_pose_failures)
    }

    pub fn to_yaw(yaw: f64, tolerance: f64, max_pose_failures: u32) -> Self {
        Self::new(HeadingTarget::Yaw(yaw), tolerance, max_pose_failures)
    }

    fn new(target: HeadingTarget, tolerance: f64, max_pose_failures: u32) -> Self {
        Self {
            target,
            tolerance,
            max_pose_failures,
            direction: None,
            consecutive_failures: 0,
        }
    }

    pub fn target(&self) -> HeadingTarget {
        self.target
    }

    pub fn direction(&self) -> Option<TurnDirection> {
        self.direction
    }

    pub fn step(&mut self, pose: Option<Pose2D>) -> TurnStep {
        let Some(pose) = pose else {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.max_pose_failures {
                return TurnStep::Failed { failures: self.consecutive_failures };
            }
            return TurnStep::Wait { failures: self.consecutive_failures };
        };
        self.consecutive_failures = 0;

        let target_yaw = match self.target {
            HeadingTarget::Toward(goal) => bearing(pose.position(), goal),
            HeadingTarget::Yaw(yaw) => yaw,
        };
        let (direction, remaining) = turn_angle(pose.yaw, target_yaw);
        if remaining <= self.tolerance {
            return TurnStep::Aligned { yaw: target_yaw };
        }

        let flipped = matches!(self.direction, Some(prev) if prev != direction);
        self.direction = Some(direction);
        TurnStep::Turn { direction, remaining, flipped }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpinStep {
    Turn(TurnDirection),
    Complete { total: f64 },
    Aborted { total: f64 },
}

/// One full clockwise revolution measured from yaw deltas.
#[derive(Debug, Clone)]
pub struct CalibrationSpin {
    noise_floor: f64,
    plausible_step: f64,
    previous: f64,
    total: f64,
}

impl CalibrationSpin {
    /// `turn_speed` in rad/s bounds the plausible per-tick delta.
    pub fn new(turn_speed: f64, noise_floor: f64) -> Self {
        Self {
            noise_floor,
            plausible_step: turn_speed.abs() / 5.0,
            previous: 0.0,
            total: 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn step(&mut self, yaw: Option<f64>) -> SpinStep {
        let Some(yaw) = yaw else {
            return SpinStep::Aborted { total: self.total };
        };
        // Clockwise rotation decreases yaw; measure it as a growing angle.
        let measured = -normalize_angle(yaw);

        if (measured - self.previous).abs() < self.noise_floor {
            return SpinStep::Turn(TurnDirection::Clockwise);
        }
        let delta = if measured >= self.previous {
            measured - self.previous
        } else {
            (PI - self.previous) + (PI + measured)
        };
        if delta <= self.plausible_step {
            self.total += delta;
        }
        self.previous = measured;

        if self.total >= 2.0 * PI {
            SpinStep::Complete { total: self.total }
        } else {
            SpinStep::Turn(TurnDirection::Clockwise)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_angle_picks_short_side() {
        let (dir, mag) = turn_angle(0.0, 0.5);
        assert_eq!(dir, TurnDirection::CounterClockwise);
        assert!((mag - 0.5).abs() < 1e-9);

        let (dir, mag) = turn_angle(0.5, -0.5);
        assert_eq!(dir, TurnDirection::Clockwise);
        assert!((mag - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_turn_angle_wraps_through_pi() {
        let (dir, mag) = turn_angle(3.0, -3.0);
        assert_eq!(dir, TurnDirection::CounterClockwise);
        assert!((mag - (2.0 * PI - 6.0)).abs() < 1e-9);

        let (dir, _) = turn_angle(-3.0, 3.0);
        assert_eq!(dir, TurnDirection::Clockwise);
    }

    #[test]
    fn test_exclusion_zone_bbox() {
        let zone = ExclusionZone::from_points(&[
            Point2D::new(14.624, -8.920),
            Point2D::new(14.624, -13.690),
            Point2D::new(0.863, -8.920),
            Point2D::new(0.863, -13.690),
        ])
        .unwrap();
        assert!(zone.contains(&Point2D::new(5.0, -10.0)));
        assert!(zone.contains(&Point2D::new(0.863, -8.920)));
        assert!(!zone.contains(&Point2D::new(0.0, -10.0)));
        assert!(ExclusionZone::from_points(&[]).is_none());
    }

    #[test]
    fn test_heading_turn_flips_and_aligns() {
        let mut turn = HeadingTurn::to_yaw(0.0, 0.05, 10);
        assert!(matches!(
            turn.step(Some(Pose2D::new(0.0, 0.0, 0.3))),
            TurnStep::Turn { direction: TurnDirection::Clockwise, flipped: false, .. }
        ));
        assert!(matches!(
            turn.step(Some(Pose2D::new(0.0, 0.0, -0.2))),
            TurnStep::Turn { direction: TurnDirection::CounterClockwise, flipped: true, .. }
        ));
        assert_eq!(turn.step(Some(Pose2D::new(0.0, 0.0, 0.01))), TurnStep::Aligned { yaw: 0.0 });
    }

    #[test]
    fn test_heading_toward_point_uses_bearing() {
        let mut turn = HeadingTurn::toward(Point2D::new(0.0, 5.0), 0.05, 10);
        let step = turn.step(Some(Pose2D::new(0.0, 0.0, 0.0)));
        assert!(matches!(step, TurnStep::Turn { direction: TurnDirection::CounterClockwise, .. }));
        let step = turn.step(Some(Pose2D::new(0.0, 0.0, PI / 2.0)));
        assert!(matches!(step, TurnStep::Aligned { yaw } if (yaw - PI / 2.0).abs() < 1e-9));
    }

    #[test]
    fn test_heading_turn_fails_after_consecutive_pose_errors() {
        let mut turn = HeadingTurn::to_yaw(1.0, 0.05, 3);
        assert_eq!(turn.step(None), TurnStep::Wait { failures: 1 });
        assert_eq!(turn.step(None), TurnStep::Wait { failures: 2 });
        turn.step(Some(Pose2D::new(0.0, 0.0, 0.0)));
        assert_eq!(turn.step(None), TurnStep::Wait { failures: 1 });
        assert_eq!(turn.step(None), TurnStep::Wait { failures: 2 });
        assert_eq!(turn.step(None), TurnStep::Failed { failures: 3 });
    }

    #[test]
    fn test_heading_turn_never_guesses_direction_without_pose() {
        let mut turn = HeadingTurn::toward(Point2D::new(0.0, 3.0), 0.05, 10);
        assert_eq!(turn.step(None), TurnStep::Wait { failures: 1 });
        assert_eq!(turn.direction(), None);

        assert!(matches!(
            turn.step(Some(Pose2D::new(0.0, 0.0, 0.0))),
            TurnStep::Turn { direction: TurnDirection::CounterClockwise, .. }
        ));
        assert_eq!(turn.step(None), TurnStep::Wait { failures: 1 });
        assert_eq!(turn.direction(), Some(TurnDirection::CounterClockwise));
    }

    #[test]
    fn test_calibration_spin_completes_one_revolution() {
        let mut spin = CalibrationSpin::new(0.4, 1e-2);
        let mut yaw = 0.0;
        let mut steps = 0;
        loop {
            yaw = normalize_angle(yaw - 0.04);
            steps += 1;
            match spin.step(Some(yaw)) {
                SpinStep::Turn(TurnDirection::Clockwise) => {}
                SpinStep::Complete { total } => {
                    assert!(total >= 2.0 * PI);
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
            assert!(steps < 400);
        }
        assert!((157..=160).contains(&steps), "steps = {}", steps);
    }

    #[test]
    fn test_calibration_spin_rejects_outliers_and_noise() {
        let mut spin = CalibrationSpin::new(0.4, 1e-2);
        spin.step(Some(-0.04));
        assert!((spin.total() - 0.04).abs() < 1e-9);
        spin.step(Some(-0.045));
        assert!((spin.total() - 0.04).abs() < 1e-9);
        spin.step(Some(-1.0));
        assert!((spin.total() - 0.04).abs() < 1e-9);
        assert_eq!(spin.step(None), SpinStep::Aborted { total: spin.total() });
    }
}
