//! Positioning algorithms

pub mod localization;

pub use localization::{LocalizationEngine, Mounting, RelativePosition};
