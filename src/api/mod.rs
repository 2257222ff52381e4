//! Host bus interface
//!
//! Message types the driver publishes and consumes, and the publisher seam
//! the driver writes through.

pub mod bus;
pub mod types;

pub use bus::{JsonLinePublisher, MemoryPublisher, PublishError, Publisher};
pub use types::{
    ActuatorControls, BusMessage, LandingTargetPose, NavState, OffboardControlMode, UwbDistance, UwbGrid,
    VehicleStatus,
};
