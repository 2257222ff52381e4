//! Single-anchor localization from range and angle of arrival
//!
//! A measurement is a range plus two angular deviations from the antenna
//! boresight. It is projected into Cartesian coordinates in the sensor frame,
//! rotated by the mounting yaw/pitch bias and then translated by the mounting
//! offset. Rotation happens before translation so that the bias stays purely
//! orientational.
//!
//! The engine keeps no state between calls; the caller owns the last good
//! estimate and keeps it whenever a measurement yields no update.

use crate::core::types::RangeMeasurement;
use nalgebra::{Rotation3, Vector3};

/// Mounting correction applied to every measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mounting {
    /// Translation into the vehicle frame (cm)
    pub offset: Vector3<f64>,
    /// Yaw bias (degrees)
    pub yaw_deg: f64,
    /// Pitch bias (degrees)
    pub pitch_deg: f64,
}

impl Default for Mounting {
    fn default() -> Self {
        Self {
            offset: Vector3::zeros(),
            yaw_deg: 0.0,
            pitch_deg: 0.0,
        }
    }
}

impl Mounting {
    pub fn new(offset: Vector3<f64>, yaw_deg: f64, pitch_deg: f64) -> Self {
        Self {
            offset,
            yaw_deg,
            pitch_deg,
        }
    }

    fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(0.0, self.pitch_deg.to_radians(), self.yaw_deg.to_radians())
    }
}

/// Output of one localization step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePosition {
    /// Position in the vehicle frame (cm), mounting correction applied
    pub position: Vector3<f64>,
    /// Measured range (cm)
    pub range_cm: f64,
    /// Bearing of the target in the vehicle frame, before translation (degrees)
    pub azimuth_deg: f64,
    /// Elevation of the target in the vehicle frame, before translation (degrees)
    pub elevation_deg: f64,
    /// Mounting correction that was applied
    pub mounting: Mounting,
}

impl RelativePosition {
    /// Position in meters
    pub fn position_m(&self) -> Vector3<f64> {
        self.position / 100.0
    }

    pub fn range_m(&self) -> f64 {
        self.range_cm / 100.0
    }

    /// Shift the estimate by a reference point, e.g. the anchor position
    pub fn translated(mut self, by: Vector3<f64>) -> Self {
        self.position += by;
        self
    }
}

/// Converts range/AoA measurements into relative positions
#[derive(Debug, Clone, Default)]
pub struct LocalizationEngine {
    mounting: Mounting,
    min_fom: u8,
}

impl LocalizationEngine {
    pub fn new(mounting: Mounting, min_fom: u8) -> Self {
        Self { mounting, min_fom }
    }

    pub fn mounting(&self) -> &Mounting {
        &self.mounting
    }

    pub fn set_mounting(&mut self, mounting: Mounting) {
        self.mounting = mounting;
    }

    pub fn set_min_fom(&mut self, min_fom: u8) {
        self.min_fom = min_fom;
    }

    /// Project a spherical measurement into the vehicle frame.
    ///
    /// Returns `None` for a non-positive or non-finite distance, or
    /// non-finite angles.
    pub fn compute_position(
        &self,
        distance: f64,
        azimuth_dev: f64,
        elevation_dev: f64,
    ) -> Option<RelativePosition> {
        if !(distance.is_finite() && distance > 0.0) {
            return None;
        }
        if !(azimuth_dev.is_finite() && elevation_dev.is_finite()) {
            return None;
        }

        let azimuth = azimuth_dev.to_radians();
        let elevation = elevation_dev.to_radians();

        let sensor = Vector3::new(
            elevation.cos() * azimuth.cos(),
            elevation.cos() * azimuth.sin(),
            elevation.sin(),
        ) * distance;

        let rotated = self.mounting.rotation() * sensor;
        let horizontal = (rotated.x * rotated.x + rotated.y * rotated.y).sqrt();

        Some(RelativePosition {
            position: rotated + self.mounting.offset,
            range_cm: distance,
            azimuth_deg: rotated.y.atan2(rotated.x).to_degrees(),
            elevation_deg: rotated.z.atan2(horizontal).to_degrees(),
            mounting: self.mounting,
        })
    }

    /// Localize a decoded measurement.
    ///
    /// Measurements whose azimuth or elevation figure of merit is below the
    /// configured threshold yield no update.
    pub fn localize(&self, measurement: &RangeMeasurement) -> Option<RelativePosition> {
        if measurement.aoa_azimuth_fom < self.min_fom || measurement.aoa_elevation_fom < self.min_fom
        {
            return None;
        }
        self.compute_position(
            measurement.distance_cm as f64,
            measurement.azimuth_deg(),
            measurement.elevation_deg(),
        )
    }
}
