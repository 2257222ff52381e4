//! Hardware abstraction for the UWB radio link
//!
//! The driver only needs a byte pipe with timeouts; framing lives in
//! `processing`.

pub mod error;
pub mod mock;
pub mod serial;
pub mod transceiver;

pub use error::{CommError, CommResult, RecoveryStrategy};
pub use mock::MockTransceiver;
pub use serial::SerialTransceiver;
pub use transceiver::{TransceiverConfig, TransceiverInterface, TransceiverStatus};
