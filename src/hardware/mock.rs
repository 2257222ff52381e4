//! Mock transceiver for testing and development

use crate::hardware::{CommError, CommResult, TransceiverInterface, TransceiverStatus};
use std::collections::VecDeque;
use std::time::Duration;

/// Scripted in-memory link.
///
/// Each queued chunk is returned by one read (split if the caller's buffer
/// is smaller). An empty queue reads as a timeout.
pub struct MockTransceiver {
    status: TransceiverStatus,
    chunks: VecDeque<Vec<u8>>,
    sent_messages: Vec<Vec<u8>>,
    failing_writes: usize,
    short_writes: usize,
    read_failure: Option<CommError>,
    resets: u32,
}

impl Default for MockTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransceiver {
    pub fn new() -> Self {
        let mut status = TransceiverStatus::new("mock");
        status.connected = true;
        Self {
            status,
            chunks: VecDeque::new(),
            sent_messages: Vec::new(),
            failing_writes: 0,
            short_writes: 0,
            read_failure: None,
            resets: 0,
        }
    }

    /// Queue bytes for a later read
    pub fn add_bytes(&mut self, data: &[u8]) {
        self.chunks.push_back(data.to_vec());
    }

    /// Queue a byte stream delivered `chunk` bytes per read
    pub fn add_chunked(&mut self, data: &[u8], chunk: usize) {
        for part in data.chunks(chunk.max(1)) {
            self.add_bytes(part);
        }
    }

    /// Make the next `count` writes fail outright
    pub fn fail_next_writes(&mut self, count: usize) {
        self.failing_writes = count;
    }

    /// Make the next `count` writes come up one byte short
    pub fn short_next_writes(&mut self, count: usize) {
        self.short_writes = count;
    }

    /// Make the next read return `error`
    pub fn fail_next_read(&mut self, error: CommError) {
        self.read_failure = Some(error);
    }

    /// Simulate connection loss
    pub fn disconnect(&mut self) {
        self.status.connected = false;
    }

    /// Every command written so far
    pub fn get_sent_messages(&self) -> &[Vec<u8>] {
        &self.sent_messages
    }

    pub fn clear_sent_messages(&mut self) {
        self.sent_messages.clear();
    }

    pub fn queued_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn reset_count(&self) -> u32 {
        self.resets
    }

    fn lost(&self) -> CommError {
        CommError::ConnectionLost {
            device: self.status.device.clone(),
        }
    }
}

impl TransceiverInterface for MockTransceiver {
    fn read_bytes(&mut self, buf: &mut [u8], _timeout: Duration) -> CommResult<usize> {
        if !self.status.connected {
            return Err(self.lost());
        }
        if let Some(error) = self.read_failure.take() {
            self.status.error_count += 1;
            return Err(error);
        }
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        self.status.bytes_received += n as u64;
        Ok(n)
    }

    fn send_message(&mut self, data: &[u8]) -> CommResult<()> {
        if !self.status.connected {
            self.status.error_count += 1;
            return Err(self.lost());
        }
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            self.status.error_count += 1;
            return Err(CommError::Io {
                details: "simulated write failure".to_string(),
            });
        }
        if self.short_writes > 0 && !data.is_empty() {
            self.short_writes -= 1;
            self.status.error_count += 1;
            return Err(CommError::ShortWrite {
                written: data.len() - 1,
                expected: data.len(),
            });
        }
        self.status.bytes_sent += data.len() as u64;
        self.sent_messages.push(data.to_vec());
        Ok(())
    }

    fn get_status(&self) -> TransceiverStatus {
        self.status.clone()
    }

    fn reset(&mut self) -> CommResult<()> {
        self.resets += 1;
        self.status.connected = true;
        self.status.error_count = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.status.connected
    }

    fn flush(&mut self) -> CommResult<()> {
        if !self.status.connected {
            return Err(self.lost());
        }
        self.chunks.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(1);

    #[test]
    fn test_scripted_reads() {
        let mut transceiver = MockTransceiver::new();
        transceiver.add_bytes(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(transceiver.read_bytes(&mut buf, T).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(transceiver.read_bytes(&mut buf, T).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(transceiver.read_bytes(&mut buf, T).unwrap(), 0);
    }

    #[test]
    fn test_injected_read_failure_is_one_shot() {
        let mut transceiver = MockTransceiver::new();
        transceiver.add_bytes(&[7]);
        transceiver.fail_next_read(CommError::Timeout { timeout_ms: 5 });

        let mut buf = [0u8; 4];
        assert!(matches!(
            transceiver.read_bytes(&mut buf, T),
            Err(CommError::Timeout { timeout_ms: 5 })
        ));
        assert_eq!(transceiver.read_bytes(&mut buf, T).unwrap(), 1);
        assert_eq!(transceiver.get_status().error_count, 1);
    }

    #[test]
    fn test_flush_drops_pending_input() {
        let mut transceiver = MockTransceiver::new();
        transceiver.add_chunked(&[1, 2, 3, 4], 2);
        assert_eq!(transceiver.queued_chunk_count(), 2);
        transceiver.flush().unwrap();
        assert_eq!(transceiver.queued_chunk_count(), 0);

        transceiver.disconnect();
        assert!(transceiver.flush().is_err());
    }

    #[test]
    fn test_write_failures() {
        let mut transceiver = MockTransceiver::new();
        transceiver.fail_next_writes(1);
        transceiver.short_next_writes(1);
        assert!(transceiver.send_message(&[1, 2]).is_err());
        assert!(matches!(
            transceiver.send_message(&[1, 2]),
            Err(CommError::ShortWrite { written: 1, expected: 2 })
        ));
        assert!(transceiver.send_message(&[1, 2]).is_ok());
        assert_eq!(transceiver.get_sent_messages(), &[vec![1, 2]]);
    }

    #[test]
    fn test_connection_simulation() {
        let mut transceiver = MockTransceiver::new();
        transceiver.disconnect();
        let mut buf = [0u8; 4];
        assert!(matches!(
            transceiver.read_bytes(&mut buf, T),
            Err(CommError::ConnectionLost { .. })
        ));
        transceiver.reset().unwrap();
        assert!(transceiver.is_connected());
        assert_eq!(transceiver.reset_count(), 1);
    }
}
