//! Serial/UART link to the UWB radio

use crate::hardware::{CommError, CommResult, TransceiverConfig, TransceiverInterface, TransceiverStatus};
use log::{debug, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Serial transceiver on top of `serialport`
pub struct SerialTransceiver {
    config: TransceiverConfig,
    port: Option<Box<dyn SerialPort>>,
    status: TransceiverStatus,
}

impl SerialTransceiver {
    /// Create a transceiver; the port is not opened until `connect`
    pub fn new(config: TransceiverConfig) -> CommResult<Self> {
        config.validate()?;
        let status = TransceiverStatus::new(&config.device);
        Ok(Self {
            config,
            port: None,
            status,
        })
    }

    /// Open the port as 8N1 without flow control
    pub fn connect(&mut self) -> CommResult<()> {
        let port = serialport::new(self.config.device.as_str(), self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.config.read_timeout())
            .open()
            .map_err(|e| {
                self.status.error_count += 1;
                CommError::from(e)
            })?;

        debug!(
            "Opened {} at {} baud",
            self.config.device, self.config.baud_rate
        );
        self.port = Some(port);
        self.status.connected = true;
        Ok(())
    }

    /// Close the port
    pub fn disconnect(&mut self) {
        self.port = None;
        self.status.connected = false;
    }

    fn port(&mut self) -> CommResult<&mut Box<dyn SerialPort>> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(CommError::ConnectionLost {
                device: self.config.device.clone(),
            }),
        }
    }

    fn note_error(&mut self, e: CommError) -> CommError {
        self.status.error_count += 1;
        if matches!(e, CommError::ConnectionLost { .. }) {
            warn!("Serial port {} lost: {}", self.config.device, e);
            self.disconnect();
        }
        e
    }
}

impl TransceiverInterface for SerialTransceiver {
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> CommResult<usize> {
        let port = self.port()?;
        if port.timeout() != timeout {
            port.set_timeout(timeout)?;
        }
        match port.read(buf) {
            Ok(n) => {
                self.status.bytes_received += n as u64;
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(self.note_error(e.into())),
        }
    }

    fn send_message(&mut self, data: &[u8]) -> CommResult<()> {
        let port = self.port()?;
        let result = port.write(data).and_then(|n| port.flush().map(|_| n));
        match result {
            Ok(n) if n == data.len() => {
                self.status.bytes_sent += n as u64;
                Ok(())
            }
            Ok(n) => Err(self.note_error(CommError::ShortWrite {
                written: n,
                expected: data.len(),
            })),
            Err(e) => Err(self.note_error(e.into())),
        }
    }

    fn get_status(&self) -> TransceiverStatus {
        self.status.clone()
    }

    fn reset(&mut self) -> CommResult<()> {
        self.disconnect();
        self.connect()
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn flush(&mut self) -> CommResult<()> {
        let port = self.port()?;
        port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_transceiver_creation() {
        let transceiver = SerialTransceiver::new(TransceiverConfig::serial("/dev/ttyUSB0", 115200)).unwrap();
        assert!(!transceiver.is_connected());
        assert_eq!(transceiver.get_status().device, "/dev/ttyUSB0");
    }

    #[test]
    fn test_invalid_config() {
        assert!(SerialTransceiver::new(TransceiverConfig::serial("", 115200)).is_err());
    }

    #[test]
    fn test_io_without_port() {
        let mut transceiver = SerialTransceiver::new(TransceiverConfig::serial("/dev/ttyUSB0", 115200)).unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            transceiver.read_bytes(&mut buf, Duration::from_millis(1)),
            Err(CommError::ConnectionLost { .. })
        ));
        assert!(transceiver.send_message(&[0x8E]).is_err());
    }

    #[test]
    fn test_missing_device() {
        let mut transceiver =
            SerialTransceiver::new(TransceiverConfig::serial("/dev/does-not-exist-uwb", 115200)).unwrap();
        assert!(transceiver.connect().is_err());
        assert!(!transceiver.is_connected());
    }
}
