//! # Broadcast Bus Abstraction
//!
//! A platform-level abstraction for fan-out messaging to live subscribers.
//!
//! ## Why This Lives in Tier 1
//!
//! The bus is a **shared runtime capability** that all modules depend on.
//! Placing it in `platform/` (Tier 1) allows:
//! - Modules to depend on platform crates without circular dependencies
//! - Plug-and-play module development (modules don't depend on each other)
//! - Config-driven swap between NATS (production) and InMemory (dev/test)
//!
//! Delivery is fire-and-forget: subscribers that are not connected when a
//! message is published never see it. Durable delivery belongs to the
//! `event-store` crate, not here.
//!
//! ## Implementations
//!
//! - **NatsBus**: Production implementation over core NATS
//! - **InMemoryBus**: Test/dev implementation using in-memory channels
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, NatsBus, InMemoryBus, BusMessage};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production: NATS
//! let nats_client = async_nats::connect("nats://localhost:4222").await?;
//! let bus: Arc<dyn EventBus> = Arc::new(NatsBus::new(nats_client));
//!
//! // Dev/Test: In-Memory
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! // Publish a typed message to a topic
//! let payload = serde_json::to_vec(&serde_json::json!({ "id": "123" }))?;
//! bus.publish("fleet.vehicles.generated", "VehicleGenerated", payload)
//!     .await?;
//!
//! // Subscribe to topics
//! let mut stream = bus.subscribe("fleet.vehicles.>").await?;
//! while let Some(msg) = futures::StreamExt::next(&mut stream).await {
//!     println!("{} bytes of {} on {}", msg.payload.len(), msg.message_type, msg.topic);
//! }
//! # Ok(())
//! # }
//! ```

mod inmemory_bus;
mod nats_bus;

pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// A message received from the broadcast bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The topic this message was published to
    pub topic: String,
    /// Application-level message type (e.g. "VehicleGenerated")
    pub message_type: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(topic: String, message_type: String, payload: Vec<u8>) -> Self {
        Self {
            topic,
            message_type,
            payload,
        }
    }
}

/// Errors that can occur when using the broadcast bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to topic: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid topic pattern: {0}")]
    InvalidTopic(String),
}

/// Result type for broadcast bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core abstraction for publish-subscribe fan-out messaging
///
/// This trait defines the interface that all bus implementations must
/// satisfy. Publishing carries no delivery guarantee; fire-and-forget
/// semantics are acceptable by contract.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a typed message to a topic
    ///
    /// # Arguments
    /// * `topic` - The topic to publish to (e.g. "fleet.vehicles.generated")
    /// * `message_type` - Application-level message type tag
    /// * `payload` - The message payload as raw bytes
    async fn publish(&self, topic: &str, message_type: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to messages matching a topic pattern
    ///
    /// # Arguments
    /// * `pattern` - The topic pattern to subscribe to (supports wildcards: `*`, `>`)
    ///   - `*` matches a single token (e.g. `fleet.*.generated`)
    ///   - `>` matches one or more tokens (e.g. `fleet.>`)
    ///
    /// # Returns
    /// * `Ok(BoxStream)` containing a stream of messages
    /// * `Err(BusError)` if subscription failed
    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
