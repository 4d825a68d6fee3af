//! In-memory implementation of the EventBus trait for testing and development

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcast bus implementation using in-memory channels
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - Integration tests that need fast, isolated message buses
///
/// Messages are fanned out to all subscribers via a Tokio broadcast channel;
/// each subscriber filters on its own topic pattern.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("fleet.vehicles.>").await?;
///
/// // Publish a message
/// bus.publish("fleet.vehicles.generated", "VehicleGenerated", b"{}".to_vec())
///     .await?;
///
/// // Receive it
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.topic, "fleet.vehicles.generated");
/// assert_eq!(msg.message_type, "VehicleGenerated");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    // Global broadcast channel for all messages
    // We use a broadcast channel with a large buffer to avoid dropping messages
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    /// Create a new in-memory bus
    ///
    /// The bus uses a broadcast channel with a buffer of 1000 messages.
    /// If this buffer is exceeded, the oldest messages will be dropped.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create a new in-memory bus with a custom buffer size
    ///
    /// # Arguments
    /// * `buffer_size` - The maximum number of messages to buffer before dropping old ones
    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Check if a topic matches a subscription pattern
    ///
    /// Supports NATS-style wildcards:
    /// - `*` matches exactly one token
    /// - `>` matches one or more tokens
    ///
    /// # Examples
    /// - `fleet.>` matches `fleet.vehicles.generated`
    /// - `fleet.*.generated` matches `fleet.vehicles.generated`
    /// - `fleet.vehicles.*` does NOT match `fleet.vehicles.one.two` (too many tokens)
    fn matches_pattern(topic: &str, pattern: &str) -> bool {
        let topic_tokens: Vec<&str> = topic.split('.').collect();
        let pattern_tokens: Vec<&str> = pattern.split('.').collect();

        let mut t_idx = 0;
        let mut p_idx = 0;

        while t_idx < topic_tokens.len() && p_idx < pattern_tokens.len() {
            let pattern_token = pattern_tokens[p_idx];

            if pattern_token == ">" {
                // `>` matches all remaining tokens
                return true;
            } else if pattern_token == "*" {
                // `*` matches exactly one token
                t_idx += 1;
                p_idx += 1;
            } else if topic_tokens[t_idx] == pattern_token {
                // Exact match
                t_idx += 1;
                p_idx += 1;
            } else {
                // No match
                return false;
            }
        }

        // Both must be exhausted for a full match (unless pattern ended with `>`)
        t_idx == topic_tokens.len() && p_idx == pattern_tokens.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, message_type: &str, payload: Vec<u8>) -> BusResult<()> {
        let msg = BusMessage::new(topic.to_string(), message_type.to_string(), payload);

        // Broadcast to all subscribers
        // We ignore the error if there are no receivers (that's fine)
        let _ = self.sender.send(msg);

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        // Filter messages based on the subscription pattern
        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if Self::matches_pattern(&msg.topic, &pattern) {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "InMemoryBus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Channel closed, end the stream
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_pattern_matching() {
        // Exact match
        assert!(InMemoryBus::matches_pattern(
            "fleet.vehicles.generated",
            "fleet.vehicles.generated"
        ));

        // Single wildcard
        assert!(InMemoryBus::matches_pattern(
            "fleet.vehicles.generated",
            "fleet.*.generated"
        ));
        assert!(InMemoryBus::matches_pattern(
            "fleet.vehicles.generated",
            "fleet.vehicles.*"
        ));
        assert!(!InMemoryBus::matches_pattern(
            "fleet.vehicles.generated",
            "fleet.*"
        ));

        // Multi-level wildcard
        assert!(InMemoryBus::matches_pattern(
            "fleet.vehicles.generated",
            "fleet.>"
        ));
        assert!(!InMemoryBus::matches_pattern(
            "fleet.vehicles.generated",
            "gateway.>"
        ));

        // Edge cases
        assert!(InMemoryBus::matches_pattern("single", "single"));
        assert!(InMemoryBus::matches_pattern("single", "*"));
        assert!(InMemoryBus::matches_pattern("single", ">"));
        assert!(!InMemoryBus::matches_pattern("one.two", "one"));
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = InMemoryBus::new();

        // Subscribe first
        let mut stream = bus.subscribe("fleet.vehicles.>").await.unwrap();

        // Publish a message
        let payload = b"test message".to_vec();
        bus.publish("fleet.vehicles.generated", "VehicleGenerated", payload.clone())
            .await
            .unwrap();

        // Receive the message
        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(msg.topic, "fleet.vehicles.generated");
        assert_eq!(msg.message_type, "VehicleGenerated");
        assert_eq!(msg.payload, payload);
    }

    #[tokio::test]
    async fn test_multiple_messages_in_order() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("test.>").await.unwrap();

        // Publish multiple messages
        for i in 0..5 {
            let payload = format!("message {}", i).into_bytes();
            bus.publish(&format!("test.msg.{}", i), "TestMessage", payload)
                .await
                .unwrap();
        }

        // Verify order
        for i in 0..5 {
            let msg = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
                .await
                .expect("timeout")
                .expect("stream ended");

            assert_eq!(msg.topic, format!("test.msg.{}", i));
            assert_eq!(msg.payload, format!("message {}", i).into_bytes());
        }
    }

    #[tokio::test]
    async fn test_wildcard_filtering() {
        let bus = InMemoryBus::new();

        // Subscribe to specific pattern
        let mut stream = bus.subscribe("fleet.vehicles.*").await.unwrap();

        // Publish matching and non-matching messages
        bus.publish("fleet.vehicles.generated", "A", b"match".to_vec())
            .await
            .unwrap();
        bus.publish("fleet.vehicles.deleted", "B", b"match".to_vec())
            .await
            .unwrap();
        bus.publish("fleet.vehicles.one.two", "C", b"no match".to_vec())
            .await
            .unwrap(); // Too deep
        bus.publish("gateway.vehicles.generated", "D", b"no match".to_vec())
            .await
            .unwrap(); // Wrong prefix

        // Should receive only the two matching messages
        let msg1 = tokio::time::timeout(std::time::Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(msg1.topic, "fleet.vehicles.generated");

        let msg2 = tokio::time::timeout(std::time::Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(msg2.topic, "fleet.vehicles.deleted");

        // No more messages should arrive
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(100), stream.next()).await;
        assert!(result.is_err(), "should timeout, no more messages");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = InMemoryBus::new();

        // Create two subscribers
        let mut stream1 = bus.subscribe("test.>").await.unwrap();
        let mut stream2 = bus.subscribe("test.>").await.unwrap();

        // Publish a message
        let payload = b"broadcast".to_vec();
        bus.publish("test.msg", "TestMessage", payload.clone())
            .await
            .unwrap();

        // Both should receive it
        let msg1 = tokio::time::timeout(std::time::Duration::from_secs(1), stream1.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        let msg2 = tokio::time::timeout(std::time::Duration::from_secs(1), stream2.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(msg1.payload, payload);
        assert_eq!(msg2.payload, payload);
    }
}
