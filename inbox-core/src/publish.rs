//! Event publishing
//!
//! The message broker is an external collaborator reached through
//! [`EventPublisher`]. Delivery is fire-and-forget: callers log failures and
//! move on, so downstream consumers must tolerate lost messages.

use crate::config::EventsConfig;
use crate::descriptor::FileDescriptor;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Logical destination of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Sidecar checksum files
    Checksums,
    /// Regular data files
    Files,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Destination::Checksums => "checksums",
            Destination::Files => "files",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode descriptor: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Publisher closed")]
    Closed,
}

/// Sink for outgoing descriptors
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, destination: Destination, descriptor: &FileDescriptor) -> Result<(), PublishError>;
}

/// Publisher handing descriptors to an in-process channel
///
/// The receiving end is typically a broker bridge task.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<(Destination, FileDescriptor)>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Destination, FileDescriptor)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, destination: Destination, descriptor: &FileDescriptor) -> Result<(), PublishError> {
        self.tx
            .send((destination, descriptor.clone()))
            .map_err(|_| PublishError::Closed)
    }
}

/// Publisher writing each message as a structured log line
pub struct LogPublisher {
    events: EventsConfig,
}

impl LogPublisher {
    pub fn new(events: EventsConfig) -> Self {
        Self { events }
    }
}

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, destination: Destination, descriptor: &FileDescriptor) -> Result<(), PublishError> {
        let body = descriptor.to_json()?;
        tracing::info!(
            exchange = %self.events.exchange,
            routing_key = %self.events.routing_key(destination),
            "{}",
            body
        );
        Ok(())
    }
}
