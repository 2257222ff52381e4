//! UWB guidance driver
//!
//! Decodes ranging and grid frames from an ultra-wideband radio on a serial
//! link, turns range/angle-of-arrival measurements into a relative position
//! and maps that position to landing-target or follow-me outputs.

pub mod algorithms;
pub mod api;
pub mod control;
pub mod core;
pub mod driver;
pub mod hardware;
pub mod processing;
pub mod utils;

// Re-export commonly used types
pub use algorithms::localization::{LocalizationEngine, Mounting, RelativePosition};
pub use api::bus::{JsonLinePublisher, MemoryPublisher, PublishError, Publisher};
pub use api::types::{BusMessage, NavState, VehicleStatus};
pub use control::{ControlOutput, FollowCommand, FollowLimits, ModeController};
pub use crate::core::types::{DistanceFrame, DriverMode, GridFrame, MacAddress, RangeMeasurement};
pub use driver::{DriverHandle, DriverInput, DriverStats, UwbDriver};
pub use hardware::{CommError, CommResult, MockTransceiver, SerialTransceiver, TransceiverConfig, TransceiverInterface};
pub use processing::{Frame, FrameCodec, FrameError};
pub use utils::config::{ConfigError, DriverParameters};
pub use utils::grid::{AnchorGrid, GridError};
