//! Configuration and grid utilities

pub mod config;
pub mod grid;
pub mod grid_file;

pub use config::{ConfigError, DriverParameters, ParameterFile};
pub use grid::{AnchorGrid, GridError};
