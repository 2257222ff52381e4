//! Publishing side of the telemetry bus
//!
//! Publishes are fire-and-forget: no acknowledgement and no backpressure.
//! A failed publish is reported to the caller, which logs it and carries on.

use crate::api::types::BusMessage;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Cannot encode {topic}: {message}")]
    Encode { topic: &'static str, message: String },
    #[error("Bus write failed")]
    Io(#[from] std::io::Error),
    #[error("Bus closed")]
    Closed,
}

/// Sink for driver output
pub trait Publisher {
    fn publish(&mut self, message: BusMessage) -> Result<(), PublishError>;
}

/// Writes one JSON object per line
pub struct JsonLinePublisher<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinePublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for JsonLinePublisher<W> {
    fn publish(&mut self, message: BusMessage) -> Result<(), PublishError> {
        let line = serde_json::to_string(&message).map_err(|e| PublishError::Encode {
            topic: message.topic(),
            message: e.to_string(),
        })?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    pub messages: Vec<BusMessage>,
    /// Number of upcoming publishes that fail
    pub fail_next: usize,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.messages.iter().filter(|m| m.topic() == topic).count()
    }

    pub fn last(&self, topic: &str) -> Option<&BusMessage> {
        self.messages.iter().rev().find(|m| m.topic() == topic)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, message: BusMessage) -> Result<(), PublishError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(PublishError::Closed);
        }
        self.messages.push(message);
        Ok(())
    }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, message: BusMessage) -> Result<(), PublishError> {
        (**self).publish(message)
    }
}
