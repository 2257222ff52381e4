//! Proportional follow-me steering

use crate::algorithms::localization::RelativePosition;
use crate::core::constants::{AOA_FIELD_OF_VIEW_DEG, FOLLOW_DECAY_TAU_S, POSITION_STALE_TIMEOUT};
use crate::utils::config::DriverParameters;
use std::time::Instant;

/// Throttle per meter of distance error (full authority over 2 m)
pub const THROTTLE_GAIN_PER_M: f64 = 0.5;

/// Distance error treated as on station (m)
pub const FOLLOW_DEADBAND_M: f64 = 0.05;

/// Bearing treated as straight ahead (degrees)
pub const HEADING_DEADBAND_DEG: f64 = 2.0;

/// Below this magnitude a decaying command is snapped to zero
const DECAY_FLOOR: f64 = 1e-3;

/// Clamp `value` into the interval spanned by `a` and `b`.
///
/// The bounds may come in either order and a NaN bound or value never
/// propagates, so stale or inconsistent parameters cannot panic.
pub fn bounded(value: f64, a: f64, b: f64) -> f64 {
    let lo = a.min(b);
    let hi = a.max(b);
    value.max(lo).min(hi)
}

/// Follow-me limits with every bound already made consistent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowLimits {
    pub distance_m: f64,
    pub distance_min_m: f64,
    pub distance_max_m: f64,
    pub throttle_forward: f64,
    pub throttle_reverse: f64,
    pub heading_gain: f64,
    pub heading_min: f64,
    pub heading_max: f64,
}

impl FollowLimits {
    pub fn from_parameters(params: &DriverParameters) -> Self {
        let distance_min_m = params.follow_distance_min.min(params.follow_distance_max).max(0.0);
        let distance_max_m = params.follow_distance_max.max(params.follow_distance_min).max(0.0);
        let heading_min = bounded(params.thrust_heading_min.min(params.thrust_heading_max), 0.0, 1.0);
        let heading_max = bounded(params.thrust_heading_max.max(params.thrust_heading_min), 0.0, 1.0);

        Self {
            distance_m: bounded(params.follow_distance, distance_min_m, distance_max_m),
            distance_min_m,
            distance_max_m,
            throttle_forward: bounded(params.throttle, 0.0, 1.0),
            throttle_reverse: bounded(params.throttle_reverse.abs(), 0.0, 1.0),
            heading_gain: if params.thrust_heading.is_finite() { params.thrust_heading } else { 0.0 },
            heading_min,
            heading_max,
        }
    }
}

/// Throttle and heading thrust setpoints
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FollowCommand {
    pub throttle: f64,
    pub heading: f64,
}

impl FollowCommand {
    pub fn is_zero(&self) -> bool {
        self.throttle == 0.0 && self.heading == 0.0
    }

    fn scaled(self, factor: f64) -> Self {
        let snap = |v: f64| if v.abs() < DECAY_FLOOR { 0.0 } else { v };
        Self {
            throttle: snap(self.throttle * factor),
            heading: snap(self.heading * factor),
        }
    }
}

/// Heading thrust toward the target, magnitude kept in [min, max]
pub fn heading_command(azimuth_deg: f64, limits: &FollowLimits) -> f64 {
    if !azimuth_deg.is_finite() || azimuth_deg.abs() < HEADING_DEADBAND_DEG {
        return 0.0;
    }
    let raw = azimuth_deg / AOA_FIELD_OF_VIEW_DEG * limits.heading_gain;
    let magnitude = bounded(raw.abs(), limits.heading_min, limits.heading_max);
    magnitude.copysign(azimuth_deg)
}

/// Throttle toward the standoff distance
pub fn throttle_command(range_m: f64, limits: &FollowLimits) -> f64 {
    if !range_m.is_finite() || range_m > limits.distance_max_m {
        // out of follow range, treat the target as lost
        return 0.0;
    }
    if range_m <= limits.distance_min_m {
        return -limits.throttle_reverse;
    }
    let error = range_m - limits.distance_m;
    if error.abs() < FOLLOW_DEADBAND_M {
        return 0.0;
    }
    bounded(
        error * THROTTLE_GAIN_PER_M,
        -limits.throttle_reverse,
        limits.throttle_forward,
    )
}

/// Follow-me controller with decay on signal loss
#[derive(Debug, Default)]
pub struct FollowController {
    last: Option<(FollowCommand, Instant)>,
}

impl FollowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Compute a fresh command from a new position estimate
    pub fn update(&mut self, position: &RelativePosition, limits: &FollowLimits, now: Instant) -> FollowCommand {
        let command = FollowCommand {
            throttle: throttle_command(position.range_m(), limits),
            heading: heading_command(position.azimuth_deg, limits),
        };
        self.last = Some((command, now));
        command
    }

    /// Command to emit when no new estimate arrived.
    ///
    /// `None` while the last command is still fresh or once the decay has
    /// reached zero; otherwise the last command scaled down by the time spent
    /// past the stale timeout.
    pub fn tick(&mut self, now: Instant) -> Option<FollowCommand> {
        let (command, at) = self.last?;
        let age = now.saturating_duration_since(at);
        if age <= POSITION_STALE_TIMEOUT {
            return None;
        }

        let overdue = (age - POSITION_STALE_TIMEOUT).as_secs_f64();
        let decayed = command.scaled((-overdue / FOLLOW_DECAY_TAU_S).exp());
        if decayed.is_zero() {
            self.last = None;
        }
        Some(decayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::localization::{LocalizationEngine, Mounting};
    use std::time::Duration;

    fn limits() -> FollowLimits {
        FollowLimits::from_parameters(&DriverParameters::default())
    }

    fn position(range_cm: f64, azimuth_deg: f64) -> RelativePosition {
        LocalizationEngine::new(Mounting::default(), 0)
            .compute_position(range_cm, azimuth_deg, 0.0)
            .unwrap()
    }

    #[test]
    fn test_bounded_handles_reversed_and_nan() {
        assert_eq!(bounded(5.0, 0.0, 1.0), 1.0);
        assert_eq!(bounded(5.0, 1.0, 0.0), 1.0);
        assert_eq!(bounded(-5.0, 1.0, 0.0), 0.0);
        assert_eq!(bounded(f64::NAN, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_limits_are_made_consistent() {
        let params = DriverParameters {
            follow_distance: 9.0,
            follow_distance_min: 3.0,
            follow_distance_max: 1.0,
            throttle: 4.0,
            throttle_reverse: -0.3,
            thrust_heading_min: 0.9,
            thrust_heading_max: 0.2,
            ..Default::default()
        };
        let limits = FollowLimits::from_parameters(&params);
        assert_eq!(limits.distance_min_m, 1.0);
        assert_eq!(limits.distance_max_m, 3.0);
        assert_eq!(limits.distance_m, 3.0);
        assert_eq!(limits.throttle_forward, 1.0);
        assert_eq!(limits.throttle_reverse, 0.3);
        assert_eq!(limits.heading_min, 0.2);
        assert_eq!(limits.heading_max, 0.9);
    }

    #[test]
    fn test_throttle_sign_convention() {
        let limits = limits();
        // default standoff 2 m inside [1, 4]
        assert!(throttle_command(3.0, &limits) > 0.0);
        assert!(throttle_command(1.5, &limits) < 0.0);
        assert_eq!(throttle_command(2.0, &limits), 0.0);
        assert_eq!(throttle_command(0.5, &limits), -limits.throttle_reverse);
        assert_eq!(throttle_command(100.0, &limits), 0.0);
    }

    #[test]
    fn test_outputs_stay_within_bounds() {
        let params = DriverParameters {
            follow_distance_max: 500.0,
            throttle: 0.35,
            throttle_reverse: 0.15,
            thrust_heading: 50.0,
            thrust_heading_min: 0.1,
            thrust_heading_max: 0.6,
            ..Default::default()
        };
        let limits = FollowLimits::from_parameters(&params);
        let mut controller = FollowController::new();
        let now = Instant::now();

        for range_cm in [1.0, 50.0, 150.0, 10_000.0, 49_999.0, 1.0e9] {
            for azimuth in [-179.0, -90.0, -3.0, 0.0, 3.0, 45.0, 179.0] {
                let cmd = controller.update(&position(range_cm, azimuth), &limits, now);
                assert!(cmd.throttle <= 0.35 && cmd.throttle >= -0.15, "{:?}", cmd);
                assert!(cmd.heading.abs() <= 0.6, "{:?}", cmd);
                if azimuth.abs() >= HEADING_DEADBAND_DEG {
                    assert!(cmd.heading.abs() >= 0.1, "{:?}", cmd);
                }
            }
        }
    }

    #[test]
    fn test_heading_turns_toward_target() {
        let limits = limits();
        assert!(heading_command(20.0, &limits) > 0.0);
        assert!(heading_command(-20.0, &limits) < 0.0);
        assert_eq!(heading_command(1.0, &limits), 0.0);
        assert!((heading_command(35.0, &limits) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stale_command_decays_to_zero() {
        let limits = limits();
        let mut controller = FollowController::new();
        let start = Instant::now();
        let cmd = controller.update(&position(350.0, 30.0), &limits, start);
        assert!(!cmd.is_zero());

        assert_eq!(controller.tick(start + Duration::from_millis(100)), None);

        let early = controller.tick(start + Duration::from_millis(600)).unwrap();
        let later = controller.tick(start + Duration::from_millis(900)).unwrap();
        assert!(early.throttle.abs() < cmd.throttle.abs());
        assert!(later.throttle.abs() < early.throttle.abs());
        assert!(later.heading.abs() < early.heading.abs());

        let last = controller.tick(start + Duration::from_secs(10)).unwrap();
        assert!(last.is_zero());
        assert_eq!(controller.tick(start + Duration::from_secs(11)), None);
    }
}
