//! Messages exchanged with the host telemetry bus

use crate::core::types::{GpsPosition, GridFrame, LocalPosition};
use serde::{Deserialize, Serialize};

/// Navigation state reported by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    /// Pilot has direct control
    #[default]
    Manual,
    /// Vehicle accepts offboard setpoints
    Offboard,
    /// Any autonomous state (mission, hold, land, ...)
    Auto,
}

/// Vehicle arming/mode status consumed by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub armed: bool,
    pub nav_state: NavState,
}

impl VehicleStatus {
    pub fn new(armed: bool, nav_state: NavState) -> Self {
        Self { armed, nav_state }
    }

    /// True when guidance output must be withheld regardless of configuration
    pub fn forces_idle(&self) -> bool {
        !self.armed || self.nav_state == NavState::Manual
    }
}

/// Raw distance telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UwbDistance {
    pub timestamp_us: u64,
    /// Sequence counter of the ranging session
    pub counter: u32,
    pub session_id: u32,
    /// Time between ranging rounds
    pub time_offset: u32,
    pub mac: u16,
    /// Mode status code of the driver when the frame was handled
    pub status: u8,
    pub distance_m: f64,
    pub nlos: u8,
    pub aoa_azimuth_dev: f64,
    pub aoa_elevation_dev: f64,
    pub aoa_azimuth_resp: f64,
    pub aoa_elevation_resp: f64,
    /// Relative position in meters, when one was computed
    pub position: Option<[f64; 3]>,
}

/// Summary of the active grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UwbGrid {
    pub timestamp_us: u64,
    pub initiator_time: u32,
    pub session_id: u32,
    pub num_anchors: u8,
    pub target_gps: GpsPosition,
    pub target_pos: LocalPosition,
    pub anchor_macs: Vec<u16>,
    pub anchor_pos: Vec<LocalPosition>,
}

impl UwbGrid {
    pub fn from_frame(frame: &GridFrame, timestamp_us: u64) -> Self {
        let (macs, positions): (Vec<_>, Vec<_>) = frame
            .anchors()
            .map(|(mac, pos)| (mac.as_u16(), pos))
            .unzip();
        Self {
            timestamp_us,
            initiator_time: frame.initiator_time,
            session_id: frame.session_id,
            num_anchors: frame.num_anchors,
            target_gps: frame.target_gps,
            target_pos: frame.target_pos,
            anchor_macs: macs,
            anchor_pos: positions,
        }
    }
}

/// Landing target relative to the vehicle, for an external landing controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandingTargetPose {
    pub timestamp_us: u64,
    pub rel_pos_valid: bool,
    pub x_rel: f64,
    pub y_rel: f64,
    pub z_rel: f64,
}

/// Offboard control mode heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffboardControlMode {
    pub timestamp_us: u64,
    pub actuator: bool,
}

/// Direct actuator setpoints for follow-me
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorControls {
    pub timestamp_us: u64,
    /// Heading thrust (-1..1)
    pub yaw: f64,
    /// Throttle (-1..1)
    pub thrust: f64,
}

/// Anything the driver publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum BusMessage {
    UwbDistance(UwbDistance),
    UwbGrid(UwbGrid),
    LandingTargetPose(LandingTargetPose),
    OffboardControlMode(OffboardControlMode),
    ActuatorControls(ActuatorControls),
}

impl BusMessage {
    pub fn topic(&self) -> &'static str {
        match self {
            BusMessage::UwbDistance(_) => "uwb_distance",
            BusMessage::UwbGrid(_) => "uwb_grid",
            BusMessage::LandingTargetPose(_) => "landing_target_pose",
            BusMessage::OffboardControlMode(_) => "offboard_control_mode",
            BusMessage::ActuatorControls(_) => "actuator_controls",
        }
    }
}
