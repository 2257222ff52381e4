//! Transceiver interface trait and configuration

use crate::core::constants::{DEFAULT_BAUD_RATE, READ_TIMEOUT};
use crate::hardware::{CommError, CommResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Byte-level link to the UWB radio
pub trait TransceiverInterface {
    /// Read whatever bytes are available into `buf`.
    ///
    /// Blocks for at most `timeout`. Returns `Ok(0)` when nothing arrived.
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> CommResult<usize>;

    /// Write a complete command; a partial write is an error
    fn send_message(&mut self, data: &[u8]) -> CommResult<()>;

    /// Get current transceiver status
    fn get_status(&self) -> TransceiverStatus;

    /// Reset the connection
    fn reset(&mut self) -> CommResult<()>;

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Drop any pending input
    fn flush(&mut self) -> CommResult<()>;
}

impl<T: TransceiverInterface + ?Sized> TransceiverInterface for Box<T> {
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> CommResult<usize> {
        (**self).read_bytes(buf, timeout)
    }

    fn send_message(&mut self, data: &[u8]) -> CommResult<()> {
        (**self).send_message(data)
    }

    fn get_status(&self) -> TransceiverStatus {
        (**self).get_status()
    }

    fn reset(&mut self) -> CommResult<()> {
        (**self).reset()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn flush(&mut self) -> CommResult<()> {
        (**self).flush()
    }
}

/// Transceiver status information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransceiverStatus {
    pub device: String,
    pub connected: bool,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub error_count: u32,
}

impl TransceiverStatus {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            ..Default::default()
        }
    }
}

/// Link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransceiverConfig {
    /// Serial device path
    pub device: String,
    pub baud_rate: u32,
    /// Timeout for a single read (milliseconds)
    pub read_timeout_ms: u32,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: READ_TIMEOUT.as_millis() as u32,
        }
    }
}

impl TransceiverConfig {
    pub fn serial(device: &str, baud_rate: u32) -> Self {
        Self {
            device: device.to_string(),
            baud_rate,
            ..Default::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms as u64)
    }

    pub fn validate(&self) -> CommResult<()> {
        if self.device.is_empty() {
            return Err(CommError::ConfigurationError {
                parameter: "device".to_string(),
                value: "<empty>".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(CommError::ConfigurationError {
                parameter: "baud_rate".to_string(),
                value: "0".to_string(),
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(CommError::ConfigurationError {
                parameter: "read_timeout_ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(TransceiverConfig::serial("/dev/ttyS3", 115200).validate().is_ok());
        assert!(TransceiverConfig::serial("", 115200).validate().is_err());
        assert!(TransceiverConfig::serial("/dev/ttyS3", 0).validate().is_err());
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(TransceiverConfig::default().read_timeout(), READ_TIMEOUT);
    }
}
