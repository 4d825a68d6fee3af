//! # Durable Event Log Abstraction
//!
//! A platform-level abstraction for append-only domain event persistence
//! with at-least-once delivery to registered consumers.
//!
//! Two delivery paths exist over the same log:
//! - **Live**: newly appended events are pushed to subscribed consumers
//!   once. Events appended with a consumer's own auto-acknowledge key are
//!   pre-acknowledged for that consumer and never delivered to it (the
//!   producing service already applied the state change itself).
//! - **Replay**: the historical event stream is re-delivered with the
//!   `sync` flag set, so consumers can rebuild a materialized view or catch
//!   up a lagging replica without re-running live-only side effects.
//!
//! ## Implementations
//!
//! - **JetStreamEventStore**: Production implementation on NATS JetStream
//! - **InMemoryEventStore**: Test/dev implementation using in-memory state
//!
//! Config-driven swap between the two follows the same convention as the
//! `event-bus` crate.

mod inmemory_store;
mod jetstream_store;
pub mod retry;

pub use inmemory_store::InMemoryEventStore;
pub use jetstream_store::JetStreamEventStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable envelope for one domain event.
///
/// `(aggregate_type, aggregate_id)` identifies the aggregate whose timeline
/// this event belongs to. The payload shape is versioned per `event_type`
/// through `event_type_version`; consumers must map a version to a decoder
/// explicitly and fail fast on versions they do not support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub event_type_version: u32,
    /// Event-specific payload; shape depends on `event_type_version`
    pub data: serde_json::Value,
    /// Acting identity, or a reserved system identity for generated events
    pub user: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event stamped with the current wall clock
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        event_type_version: u32,
        user: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            event_type_version,
            data,
            user: user.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One delivery of an event to a consumer
#[derive(Debug, Clone)]
pub struct EventDelivery {
    pub event: Event,
    /// True when this delivery is part of a recovery/synchronization pass
    /// rather than live one-time processing
    pub sync: bool,
}

/// Acknowledgment returned by a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendAck {
    /// Position of the event in the log
    pub sequence: u64,
}

/// Errors that can occur when using the event log
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("failed to append event: {0}")]
    AppendError(String),

    #[error("failed to subscribe consumer: {0}")]
    SubscribeError(String),

    #[error("failed to replay events: {0}")]
    ReplayError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for event log operations
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Append-only domain event log with at-least-once consumer delivery
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably append an event to the log
    ///
    /// # Arguments
    /// * `event` - The event to persist
    /// * `ack_key` - Optional auto-acknowledge key: the consumer subscribed
    ///   with this key never receives the event live (it produced it and has
    ///   already applied the state change). Replay delivers it regardless.
    async fn append(&self, event: &Event, ack_key: Option<&str>) -> EventStoreResult<AppendAck>;

    /// Subscribe a consumer to live deliveries of the given aggregate types
    ///
    /// Delivery is at-least-once; consumers must tolerate duplicates.
    async fn subscribe(
        &self,
        consumer_key: &str,
        aggregate_types: &[&str],
    ) -> EventStoreResult<BoxStream<'static, EventDelivery>>;

    /// Replay the historical event stream for the given aggregate types
    ///
    /// Every delivery carries `sync = true`. The stream ends once the events
    /// present at call time have been delivered.
    async fn replay(
        &self,
        aggregate_types: &[&str],
    ) -> EventStoreResult<BoxStream<'static, EventDelivery>>;
}

impl fmt::Debug for dyn EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventStore")
    }
}
