//! Anchor grid model
//!
//! Holds the most recent valid grid configuration and answers anchor lookups
//! for the localization step. A candidate grid is validated completely before
//! it replaces the active one.

use crate::core::constants::MAX_ANCHORS;
use crate::core::types::{GridFrame, LocalPosition, MacAddress};
use log::info;
use nalgebra::Vector3;
use std::collections::HashMap;
use thiserror::Error;

/// Reasons a grid is refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("Grid declares {0} anchors, more than the supported maximum")]
    TooManyAnchors(u8),
    #[error("Grid declares no anchors")]
    NoAnchors,
    #[error("Anchor MAC {0} appears more than once")]
    DuplicateMac(MacAddress),
    #[error("Target GPS position is not finite")]
    InvalidGps,
}

/// Active grid and its anchor index
#[derive(Debug, Default)]
pub struct AnchorGrid {
    frame: Option<GridFrame>,
    anchors: HashMap<MacAddress, LocalPosition>,
}

impl AnchorGrid {
    /// Create an empty model (no grid loaded)
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a grid without installing it
    pub fn validate(frame: &GridFrame) -> Result<HashMap<MacAddress, LocalPosition>, GridError> {
        if frame.num_anchors as usize > MAX_ANCHORS {
            return Err(GridError::TooManyAnchors(frame.num_anchors));
        }
        if frame.num_anchors == 0 {
            return Err(GridError::NoAnchors);
        }
        if !frame.target_gps.is_finite() {
            return Err(GridError::InvalidGps);
        }

        let mut anchors = HashMap::with_capacity(frame.num_anchors as usize);
        for (mac, position) in frame.anchors() {
            if anchors.insert(mac, position).is_some() {
                return Err(GridError::DuplicateMac(mac));
            }
        }
        Ok(anchors)
    }

    /// Replace the active grid. On error the previous grid stays in place.
    pub fn load(&mut self, frame: GridFrame) -> Result<(), GridError> {
        let anchors = Self::validate(&frame)?;
        info!(
            "Loaded UWB grid: session {} with {} anchors",
            frame.session_id, frame.num_anchors
        );
        self.anchors = anchors;
        self.frame = Some(frame);
        Ok(())
    }

    /// Forget the active grid
    pub fn clear(&mut self) {
        self.frame = None;
        self.anchors.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.frame.is_some()
    }

    pub fn frame(&self) -> Option<&GridFrame> {
        self.frame.as_ref()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    /// Local position of an anchor, `None` if the MAC is not part of the grid
    pub fn anchor_position(&self, mac: MacAddress) -> Option<Vector3<f64>> {
        self.anchors.get(&mac).map(LocalPosition::to_vector3)
    }

    /// Configured landing-target offset in the local frame (cm); zero without a grid
    pub fn target_offset(&self) -> Vector3<f64> {
        self.frame
            .as_ref()
            .map(|frame| frame.target_pos.to_vector3())
            .unwrap_or_else(Vector3::zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GpsPosition;

    fn two_anchor_grid() -> GridFrame {
        let mut grid = GridFrame {
            session_id: 5,
            num_anchors: 2,
            target_pos: LocalPosition::new(0, 0, -50),
            ..Default::default()
        };
        grid.anchor_macs[0] = MacAddress::from_u16(0x0001);
        grid.anchor_macs[1] = MacAddress::from_u16(0x0002);
        grid.anchor_pos[0] = LocalPosition::new(100, 0, 0);
        grid.anchor_pos[1] = LocalPosition::new(-100, 0, 0);
        grid
    }

    #[test]
    fn test_lookup_after_load() {
        let mut model = AnchorGrid::new();
        assert!(!model.is_loaded());
        assert_eq!(model.target_offset(), Vector3::zeros());

        model.load(two_anchor_grid()).unwrap();
        assert!(model.is_loaded());
        assert_eq!(model.anchor_count(), 2);
        assert_eq!(
            model.anchor_position(MacAddress::from_u16(0x0002)),
            Some(Vector3::new(-100.0, 0.0, 0.0))
        );
        assert_eq!(model.anchor_position(MacAddress::from_u16(0x0009)), None);
        assert_eq!(model.target_offset(), Vector3::new(0.0, 0.0, -50.0));
    }

    #[test]
    fn test_invalid_grid_keeps_previous() {
        let mut model = AnchorGrid::new();
        model.load(two_anchor_grid()).unwrap();

        let mut duplicate = two_anchor_grid();
        duplicate.session_id = 6;
        duplicate.anchor_macs[1] = duplicate.anchor_macs[0];
        assert!(matches!(model.load(duplicate), Err(GridError::DuplicateMac(_))));

        let mut bad_gps = two_anchor_grid();
        bad_gps.target_gps = GpsPosition {
            lat: f32::NAN,
            ..Default::default()
        };
        assert_eq!(model.load(bad_gps), Err(GridError::InvalidGps));

        assert_eq!(model.frame().map(|f| f.session_id), Some(5));
        assert!(model.anchor_position(MacAddress::from_u16(0x0001)).is_some());
    }

    #[test]
    fn test_anchor_count_limits() {
        let mut grid = two_anchor_grid();
        grid.num_anchors = 13;
        assert_eq!(AnchorGrid::validate(&grid), Err(GridError::TooManyAnchors(13)));

        grid.num_anchors = 0;
        assert_eq!(AnchorGrid::validate(&grid), Err(GridError::NoAnchors));
    }
}
