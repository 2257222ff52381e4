//! Communication error types and handling

use thiserror::Error;

/// Communication error types for the UWB radio link
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommError {
    /// Port could not be opened or the device went away
    #[error("Connection lost to {device}")]
    ConnectionLost { device: String },
    /// Timeout waiting for the device
    #[error("Communication timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u32 },
    /// Fewer bytes written than requested
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    /// Any other I/O failure reported by the port
    #[error("I/O error: {details}")]
    Io { details: String },
    /// Invalid link configuration
    #[error("Configuration error: invalid {parameter} = {value}")]
    ConfigurationError { parameter: String, value: String },
}

impl From<std::io::Error> for CommError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => CommError::Timeout { timeout_ms: 0 },
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof => CommError::ConnectionLost {
                device: e.to_string(),
            },
            _ => CommError::Io {
                details: e.to_string(),
            },
        }
    }
}

impl From<serialport::Error> for CommError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => CommError::ConnectionLost {
                device: e.description,
            },
            serialport::ErrorKind::InvalidInput => CommError::ConfigurationError {
                parameter: "port".to_string(),
                value: e.description,
            },
            _ => CommError::Io {
                details: e.description,
            },
        }
    }
}

/// Result type for communication operations
pub type CommResult<T> = Result<T, CommError>;

/// Error recovery strategy for communication failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry the operation on the next pass
    Retry,
    /// Wait and then retry
    RetryWithDelay { delay_ms: u32 },
    /// Reset the connection and retry
    ResetAndRetry,
    /// Not recoverable by retrying; back off and report
    Fail,
}

impl CommError {
    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CommError::ConnectionLost { .. } => RecoveryStrategy::ResetAndRetry,
            CommError::Timeout { .. } => RecoveryStrategy::Retry,
            CommError::ShortWrite { .. } => RecoveryStrategy::Retry,
            CommError::Io { .. } => RecoveryStrategy::RetryWithDelay { delay_ms: 100 },
            CommError::ConfigurationError { .. } => RecoveryStrategy::Fail,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.recovery_strategy(), RecoveryStrategy::Fail)
    }
}
