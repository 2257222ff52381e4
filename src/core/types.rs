//! Core data types for ranging and grid frames

use crate::core::constants::{AOA_SCALE, MAX_ANCHORS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Short (2-byte) MAC address of a UWB device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 2]);

impl MacAddress {
    pub fn new(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }

    pub fn from_u16(value: u16) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_u16(&self) -> u16 {
        u16::from_be_bytes(self.0)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.0[0], self.0[1])
    }
}

/// One ranging exchange with a single anchor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeMeasurement {
    pub mac: MacAddress,
    pub status: u8,
    /// Distance in centimeters
    pub distance_cm: u16,
    /// Non line-of-sight flag as reported by the chip
    pub nlos: u8,
    pub aoa_azimuth: i16,
    pub aoa_elevation: i16,
    pub aoa_dest_azimuth: i16,
    pub aoa_dest_elevation: i16,
    pub aoa_azimuth_fom: u8,
    pub aoa_elevation_fom: u8,
    pub aoa_dest_azimuth_fom: u8,
    pub aoa_dest_elevation_fom: u8,
}

/// Convert a raw Q9.7 AoA field into degrees.
///
/// The chip reports the angle with the opposite sign to the body frame, hence the negation.
pub fn aoa_to_degrees(raw: i16) -> f64 {
    -(raw as f64) / AOA_SCALE
}

impl RangeMeasurement {
    pub fn azimuth_deg(&self) -> f64 {
        aoa_to_degrees(self.aoa_azimuth)
    }

    pub fn elevation_deg(&self) -> f64 {
        aoa_to_degrees(self.aoa_elevation)
    }

    pub fn dest_azimuth_deg(&self) -> f64 {
        aoa_to_degrees(self.aoa_dest_azimuth)
    }

    pub fn dest_elevation_deg(&self) -> f64 {
        aoa_to_degrees(self.aoa_dest_elevation)
    }
}

/// Distance-result frame as sent by the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceFrame {
    /// Ranges since the last start of ranging
    pub seq_ctr: u32,
    pub session_id: u32,
    /// Time between ranging rounds
    pub range_interval: u32,
    pub mac: MacAddress,
    pub measurement: RangeMeasurement,
}

/// GPS position of the landing point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsPosition {
    pub lat: f32,
    pub lon: f32,
    pub alt: f32,
    /// Offset to true north
    pub yaw: f32,
}

impl GpsPosition {
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.alt.is_finite() && self.yaw.is_finite()
    }
}

/// Position in the local grid frame, centimeters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalPosition {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl LocalPosition {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector3(&self) -> nalgebra::Vector3<f64> {
        nalgebra::Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

/// MAC addressing used by the anchors of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacMode {
    /// 2-byte short addresses
    #[default]
    Short,
    /// 8-byte extended addresses; only the short alias travels in frames
    Extended,
}

impl MacMode {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            2 => Some(MacMode::Short),
            8 => Some(MacMode::Extended),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            MacMode::Short => 2,
            MacMode::Extended => 8,
        }
    }
}

/// Grid configuration: anchors, landing target and session metadata
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridFrame {
    pub initiator_time: u32,
    pub session_id: u32,
    pub num_anchors: u8,
    pub target_gps: GpsPosition,
    pub mac_mode: MacMode,
    pub anchor_macs: [MacAddress; MAX_ANCHORS],
    pub target_pos: LocalPosition,
    pub anchor_pos: [LocalPosition; MAX_ANCHORS],
}

impl GridFrame {
    /// Configured anchors as (MAC, position) pairs
    pub fn anchors(&self) -> impl Iterator<Item = (MacAddress, LocalPosition)> + '_ {
        let count = (self.num_anchors as usize).min(MAX_ANCHORS);
        self.anchor_macs[..count]
            .iter()
            .copied()
            .zip(self.anchor_pos[..count].iter().copied())
    }
}

/// Operating mode of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    /// Raw distance telemetry only
    #[default]
    Data,
    /// Landing-target pose for an external landing controller
    PrecisionNavigation,
    /// Proportional steering toward a tagged target
    FollowMe,
}

impl DriverMode {
    /// Status code stamped on distance telemetry
    pub fn status_code(self) -> u8 {
        match self {
            DriverMode::Data => 9,
            DriverMode::PrecisionNavigation => 10,
            DriverMode::FollowMe => 11,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DriverMode::Data => "data",
            DriverMode::PrecisionNavigation => "precision_navigation",
            DriverMode::FollowMe => "follow_me",
        }
    }
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DriverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(DriverMode::Data),
            "precision_navigation" | "prec_nav" => Ok(DriverMode::PrecisionNavigation),
            "follow_me" => Ok(DriverMode::FollowMe),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aoa_conversion() {
        assert_eq!(aoa_to_degrees(0), 0.0);
        assert_eq!(aoa_to_degrees(128), -1.0);
        assert_eq!(aoa_to_degrees(-1280), 10.0);
    }

    #[test]
    fn test_mac_mode_wire_values() {
        assert_eq!(MacMode::from_wire(2), Some(MacMode::Short));
        assert_eq!(MacMode::from_wire(8), Some(MacMode::Extended));
        assert_eq!(MacMode::from_wire(4), None);
    }

    #[test]
    fn test_grid_anchors_iterates_declared_count() {
        let mut grid = GridFrame::default();
        grid.num_anchors = 2;
        grid.anchor_macs[0] = MacAddress::from_u16(0x1001);
        grid.anchor_macs[1] = MacAddress::from_u16(0x1002);
        grid.anchor_pos[1] = LocalPosition::new(-100, 0, 0);

        let anchors: Vec<_> = grid.anchors().collect();
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[1].0.as_u16(), 0x1002);
        assert_eq!(anchors[1].1.x, -100);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("follow_me".parse::<DriverMode>(), Ok(DriverMode::FollowMe));
        assert!("landing".parse::<DriverMode>().is_err());
        assert_eq!(DriverMode::PrecisionNavigation.status_code(), 10);
    }
}
