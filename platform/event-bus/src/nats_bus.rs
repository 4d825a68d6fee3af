//! NATS-based implementation of the EventBus trait

use crate::{BusError, BusMessage, BusResult, EventBus};
use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

/// Header carrying the application-level message type on the wire.
const MESSAGE_TYPE_HEADER: &str = "message-type";

/// Broadcast bus implementation using core NATS
///
/// This is the production implementation that connects to a NATS server.
/// It wraps an `async_nats::Client` and implements the `EventBus` trait.
/// Topics map 1:1 onto NATS subjects; the message type travels in a header.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats_client = async_nats::connect("nats://localhost:4222").await?;
/// let bus = NatsBus::new(nats_client);
///
/// bus.publish("fleet.vehicles.generated", "VehicleGenerated", b"{}".to_vec())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    /// Create a new NatsBus from an existing NATS client
    ///
    /// # Arguments
    /// * `client` - An already-connected `async_nats::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying NATS client
    ///
    /// This is useful for advanced use cases that need direct access to NATS
    /// features not exposed through the EventBus trait.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, topic: &str, message_type: &str, payload: Vec<u8>) -> BusResult<()> {
        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_TYPE_HEADER, message_type);

        self.client
            .publish_with_headers(topic.to_string(), headers, payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let subscriber = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        // Convert NATS messages to BusMessages
        let stream = subscriber.map(|nats_msg| {
            let message_type = nats_msg
                .headers
                .as_ref()
                .and_then(|h| h.get(MESSAGE_TYPE_HEADER))
                .map(|v| v.to_string())
                .unwrap_or_default();

            BusMessage::new(
                nats_msg.subject.to_string(),
                message_type,
                nats_msg.payload.to_vec(),
            )
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running NATS server
    // For CI, use InMemoryBus tests instead
    // For manual testing: docker run -p 4222:4222 nats:2.10-alpine

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_nats_bus_publish_subscribe() {
        let client = async_nats::connect("nats://localhost:4222")
            .await
            .expect("NATS server must be running on localhost:4222");

        let bus = NatsBus::new(client);

        // Subscribe first
        let mut stream = bus.subscribe("test.nats.>").await.unwrap();

        // Publish a message
        let payload = b"test message".to_vec();
        bus.publish("test.nats.hello", "TestMessage", payload.clone())
            .await
            .unwrap();

        // Receive the message
        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended");

        assert_eq!(msg.topic, "test.nats.hello");
        assert_eq!(msg.message_type, "TestMessage");
        assert_eq!(msg.payload, payload);
    }
}
