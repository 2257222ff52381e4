//! Guidance mode selection
//!
//! The configured mode only takes effect at the next session start. Between
//! sessions the controller simply records it. Independently of the latched
//! mode, the effective mode falls back to `Data` whenever the vehicle is
//! disarmed or under manual control, or no anchor grid is loaded.
//!
//! Outputs derived from a position estimate go stale after
//! [`POSITION_STALE_TIMEOUT`]: follow-me decays, and the landing target is
//! republished once as invalid.

pub mod follow;

pub use follow::{bounded, FollowCommand, FollowController, FollowLimits};

use crate::algorithms::localization::RelativePosition;
use crate::api::types::{NavState, VehicleStatus};
use crate::core::constants::POSITION_STALE_TIMEOUT;
use crate::core::types::DriverMode;
use log::info;
use nalgebra::Vector3;
use std::time::Instant;

/// What the driver should publish for a control pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlOutput {
    /// Distance telemetry only
    Idle,
    /// Landing target relative to the vehicle (m); `valid` is false once stale
    LandingTarget { position_m: Vector3<f64>, valid: bool },
    /// Follow-me setpoints; `actuate` is false unless the vehicle is offboard
    Follow { command: FollowCommand, actuate: bool },
}

#[derive(Debug)]
pub struct ModeController {
    configured: DriverMode,
    latched: DriverMode,
    session_open: bool,
    vehicle: VehicleStatus,
    effective: DriverMode,
    follow: FollowController,
    landing: Option<(Vector3<f64>, Instant)>,
}

impl ModeController {
    pub fn new(mode: DriverMode) -> Self {
        Self {
            configured: mode,
            latched: mode,
            session_open: false,
            vehicle: VehicleStatus::default(),
            effective: DriverMode::Data,
            follow: FollowController::new(),
            landing: None,
        }
    }

    pub fn configured_mode(&self) -> DriverMode {
        self.configured
    }

    /// Mode latched for the current (or next) session
    pub fn latched_mode(&self) -> DriverMode {
        self.latched
    }

    pub fn vehicle_status(&self) -> VehicleStatus {
        self.vehicle
    }

    /// Record a new configured mode; applied at the next session start
    pub fn configure(&mut self, mode: DriverMode) {
        if mode == self.configured {
            return;
        }
        self.configured = mode;
        if self.session_open {
            info!("Mode {} takes effect when the session restarts", mode);
        } else {
            self.latched = mode;
        }
    }

    pub fn begin_session(&mut self) -> DriverMode {
        self.latched = self.configured;
        self.session_open = true;
        self.follow.reset();
        self.landing = None;
        self.latched
    }

    pub fn end_session(&mut self) {
        self.session_open = false;
        self.follow.reset();
        self.landing = None;
    }

    pub fn set_vehicle_status(&mut self, status: VehicleStatus) {
        self.vehicle = status;
    }

    /// Mode after the safety and grid fallbacks
    pub fn effective_mode(&self, grid_loaded: bool) -> DriverMode {
        if self.vehicle.forces_idle() || !grid_loaded {
            DriverMode::Data
        } else {
            self.latched
        }
    }

    fn refresh(&mut self, grid_loaded: bool) -> DriverMode {
        let mode = self.effective_mode(grid_loaded);
        if mode != self.effective {
            info!("Guidance mode {} -> {}", self.effective, mode);
            if mode != DriverMode::FollowMe {
                self.follow.reset();
            }
            if mode != DriverMode::PrecisionNavigation {
                self.landing = None;
            }
            self.effective = mode;
        }
        mode
    }

    /// Handle a fresh position estimate
    pub fn update(
        &mut self,
        position: &RelativePosition,
        limits: &FollowLimits,
        grid_loaded: bool,
        now: Instant,
    ) -> ControlOutput {
        match self.refresh(grid_loaded) {
            DriverMode::Data => ControlOutput::Idle,
            DriverMode::PrecisionNavigation => {
                let position_m = position.position_m();
                self.landing = Some((position_m, now));
                ControlOutput::LandingTarget {
                    position_m,
                    valid: true,
                }
            }
            DriverMode::FollowMe => ControlOutput::Follow {
                command: self.follow.update(position, limits, now),
                actuate: self.vehicle.nav_state == NavState::Offboard,
            },
        }
    }

    /// Control pass without a new estimate.
    ///
    /// Follow-me decays the last command once it has gone stale. Precision
    /// navigation withdraws a stale landing target with a single invalid
    /// report.
    pub fn tick(&mut self, grid_loaded: bool, now: Instant) -> Option<ControlOutput> {
        match self.refresh(grid_loaded) {
            DriverMode::Data => None,
            DriverMode::PrecisionNavigation => {
                let (position_m, at) = self.landing?;
                if now.saturating_duration_since(at) <= POSITION_STALE_TIMEOUT {
                    return None;
                }
                self.landing = None;
                Some(ControlOutput::LandingTarget {
                    position_m,
                    valid: false,
                })
            }
            DriverMode::FollowMe => self.follow.tick(now).map(|command| ControlOutput::Follow {
                command,
                actuate: self.vehicle.nav_state == NavState::Offboard,
            }),
        }
    }
}
