use crate::core::types::DriverMode;
use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Tunable driver parameters.
///
/// A value of this type is treated as an immutable snapshot: the driver swaps
/// whole snapshots in at the refresh interval and never edits one in place.
/// Bounds between related fields are not checked here; consumers clamp at
/// the point of use because an external store may hand over stale values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverParameters {
    /// Serial device of the transceiver (only read at start-up)
    pub serial_port: Option<String>,
    /// Operating mode, latched at the start of each ranging session
    pub mode: DriverMode,
    /// Mounting offset of the sensor in the body frame (cm)
    pub init_offset_x: f64,
    pub init_offset_y: f64,
    pub init_offset_z: f64,
    /// Mounting yaw bias (degrees)
    pub init_yaw: f64,
    /// Mounting pitch bias (degrees)
    pub init_pitch: f64,
    /// Nominal follow-me standoff distance (m)
    pub follow_distance: f64,
    pub follow_distance_min: f64,
    pub follow_distance_max: f64,
    /// Forward throttle limit (0..1)
    pub throttle: f64,
    /// Reverse throttle limit, as a magnitude (0..1)
    pub throttle_reverse: f64,
    /// Heading thrust gain
    pub thrust_heading: f64,
    pub thrust_heading_min: f64,
    pub thrust_heading_max: f64,
    /// Minimum AoA figure of merit accepted for localization
    pub min_aoa_fom: u8,
}

impl Default for DriverParameters {
    fn default() -> Self {
        Self {
            serial_port: None,
            mode: DriverMode::Data,
            init_offset_x: 0.0,
            init_offset_y: 0.0,
            init_offset_z: 0.0,
            init_yaw: 0.0,
            init_pitch: 0.0,
            follow_distance: 2.0,
            follow_distance_min: 1.0,
            follow_distance_max: 4.0,
            throttle: 0.5,
            throttle_reverse: 0.2,
            thrust_heading: 1.0,
            thrust_heading_min: 0.0,
            thrust_heading_max: 0.8,
            min_aoa_fom: 20,
        }
    }
}

impl DriverParameters {
    /// Load parameters from a JSON file; absent fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read parameter file '{}': {}", path_str, e),
        })?;

        Self::from_json(&content).map_err(|e| match e {
            ConfigError::SerializationError { message } => ConfigError::SerializationError {
                message: format!("'{}': {}", path_str, message),
            },
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::SerializationError {
            message: e.to_string(),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
            message: e.to_string(),
        })
    }

    /// Sensor mounting translation (cm)
    pub fn mounting_offset(&self) -> Vector3<f64> {
        Vector3::new(self.init_offset_x, self.init_offset_y, self.init_offset_z)
    }
}

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{message}")]
    IoError { message: String },
    #[error("Cannot parse configuration: {message}")]
    SerializationError { message: String },
    #[error("Line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
    #[error("Missing '{record}' record")]
    MissingRecord { record: String },
    #[error("Grid declares {declared} anchors but lists {found}")]
    AnchorCountMismatch { declared: usize, found: usize },
}

/// A parameter file polled for modifications
#[derive(Debug)]
pub struct ParameterFile {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ParameterFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file if it changed since the last successful poll.
    ///
    /// Returns `None` when nothing changed.
    pub fn poll(&mut self) -> Option<Result<DriverParameters, ConfigError>> {
        let modified = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                return Some(Err(ConfigError::IoError {
                    message: format!("Cannot stat '{}': {}", self.path.display(), e),
                }))
            }
        };

        if self.last_modified == Some(modified) {
            return None;
        }

        debug!("Parameter file '{}' changed", self.path.display());
        let result = DriverParameters::from_file(&self.path);
        if result.is_ok() {
            self.last_modified = Some(modified);
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("uwb_guidance_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params = DriverParameters::from_json(
            r#"{ "mode": "follow_me", "follow_distance": 3.5, "init_offset_z": -12.0 }"#,
        )
        .unwrap();

        assert_eq!(params.mode, DriverMode::FollowMe);
        assert_eq!(params.follow_distance, 3.5);
        assert_eq!(params.mounting_offset(), Vector3::new(0.0, 0.0, -12.0));
        assert_eq!(params.throttle, DriverParameters::default().throttle);
    }

    #[test]
    fn test_numeric_mode_rejected() {
        let result = DriverParameters::from_json(r#"{ "mode": -1 }"#);
        assert!(matches!(result, Err(ConfigError::SerializationError { .. })));
    }

    #[test]
    fn test_json_round_trip() {
        let mut params = DriverParameters::default();
        params.mode = DriverMode::PrecisionNavigation;
        params.init_yaw = 15.0;
        let json = params.to_json_pretty().unwrap();
        assert!(json.contains("\"precision_navigation\""));
        assert_eq!(DriverParameters::from_json(&json).unwrap(), params);
    }

    #[test]
    fn test_parameter_file_poll() {
        let path = temp_path("params.json");
        fs::write(&path, r#"{ "throttle": 0.3 }"#).unwrap();

        let mut file = ParameterFile::new(&path);
        let first = file.poll().unwrap().unwrap();
        assert_eq!(first.throttle, 0.3);
        assert!(file.poll().is_none());

        fs::remove_file(&path).unwrap();
        assert!(matches!(file.poll(), Some(Err(ConfigError::IoError { .. }))));
    }

    #[test]
    fn test_missing_file() {
        let result = DriverParameters::from_file(temp_path("does_not_exist.json"));
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
