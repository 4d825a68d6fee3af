//! In-memory implementation of the EventStore trait for testing and development

use crate::{AppendAck, Event, EventDelivery, EventStore, EventStoreResult};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// One appended log entry, together with its auto-acknowledge bookkeeping
#[derive(Debug, Clone)]
struct LogEntry {
    event: Event,
    ack_key: Option<String>,
}

/// Event log implementation backed by in-process state
///
/// Suitable for unit tests, local development without Docker, and
/// integration tests that need a fast, isolated log. The full event history
/// is retained for the lifetime of the process, which is exactly what the
/// recovery replay path needs in tests.
///
/// # Example
/// ```rust
/// use event_store::{Event, EventStore, InMemoryEventStore};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEventStore::new();
///
/// let mut live = store.subscribe("reporting", &["Vehicle"]).await?;
///
/// let event = Event::new("Vehicle", "v-1", "Generated", 1, "SYSTEM", serde_json::json!({}));
/// store.append(&event, None).await?;
///
/// let delivery = live.next().await.unwrap();
/// assert!(!delivery.sync);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryEventStore {
    log: Arc<Mutex<Vec<LogEntry>>>,
    sender: Arc<broadcast::Sender<LogEntry>>,
}

impl InMemoryEventStore {
    /// Create a new in-memory event log
    ///
    /// Live deliveries flow through a broadcast channel buffering 1000
    /// entries; a subscriber that lags further than that skips ahead.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            sender: Arc::new(sender),
        }
    }

    /// Number of events currently in the log
    pub fn len(&self) -> usize {
        self.log.lock().expect("event log lock poisoned").len()
    }

    /// True when nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all appended events, in append order
    ///
    /// Test helper; production consumers go through `subscribe`/`replay`.
    pub fn events(&self) -> Vec<Event> {
        self.log
            .lock()
            .expect("event log lock poisoned")
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &Event, ack_key: Option<&str>) -> EventStoreResult<AppendAck> {
        let entry = LogEntry {
            event: event.clone(),
            ack_key: ack_key.map(|k| k.to_string()),
        };

        let sequence = {
            let mut log = self.log.lock().expect("event log lock poisoned");
            log.push(entry.clone());
            log.len() as u64
        };

        // Fan out to live subscribers; no receivers is fine
        let _ = self.sender.send(entry);

        Ok(AppendAck { sequence })
    }

    async fn subscribe(
        &self,
        consumer_key: &str,
        aggregate_types: &[&str],
    ) -> EventStoreResult<BoxStream<'static, EventDelivery>> {
        let mut receiver = self.sender.subscribe();
        let consumer_key = consumer_key.to_string();
        let aggregate_types: Vec<String> =
            aggregate_types.iter().map(|t| t.to_string()).collect();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(entry) => {
                        if !aggregate_types.contains(&entry.event.aggregate_type) {
                            continue;
                        }
                        // Auto-acknowledged for the producing consumer
                        if entry.ack_key.as_deref() == Some(consumer_key.as_str()) {
                            continue;
                        }
                        yield EventDelivery { event: entry.event, sync: false };
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, consumer_key = %consumer_key, "event log subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn replay(
        &self,
        aggregate_types: &[&str],
    ) -> EventStoreResult<BoxStream<'static, EventDelivery>> {
        let deliveries: Vec<EventDelivery> = {
            let log = self.log.lock().expect("event log lock poisoned");
            log.iter()
                .filter(|entry| {
                    aggregate_types
                        .iter()
                        .any(|t| *t == entry.event.aggregate_type)
                })
                .map(|entry| EventDelivery {
                    event: entry.event.clone(),
                    sync: true,
                })
                .collect()
        };

        Ok(futures::stream::iter(deliveries).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event(aggregate_id: &str) -> Event {
        Event::new(
            "Vehicle",
            aggregate_id,
            "Generated",
            1,
            "SYSTEM",
            json!({"type": "SUV"}),
        )
    }

    #[tokio::test]
    async fn test_append_then_live_delivery() {
        let store = InMemoryEventStore::new();
        let mut live = store.subscribe("reporting", &["Vehicle"]).await.unwrap();

        store.append(&sample_event("v-1"), None).await.unwrap();

        let delivery = tokio::time::timeout(std::time::Duration::from_secs(1), live.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(delivery.event.aggregate_id, "v-1");
        assert!(!delivery.sync);
    }

    #[tokio::test]
    async fn test_ack_key_suppresses_own_live_delivery() {
        let store = InMemoryEventStore::new();
        let mut own = store.subscribe("vehicles", &["Vehicle"]).await.unwrap();
        let mut other = store.subscribe("reporting", &["Vehicle"]).await.unwrap();

        store
            .append(&sample_event("v-1"), Some("vehicles"))
            .await
            .unwrap();

        // The producing consumer is pre-acknowledged
        let own_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), own.next()).await;
        assert!(own_result.is_err(), "producer must not see its own event");

        // Everyone else still gets it
        let delivery = tokio::time::timeout(std::time::Duration::from_secs(1), other.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(delivery.event.aggregate_id, "v-1");
    }

    #[tokio::test]
    async fn test_aggregate_type_filter() {
        let store = InMemoryEventStore::new();
        let mut live = store.subscribe("reporting", &["Vehicles"]).await.unwrap();

        store.append(&sample_event("v-1"), None).await.unwrap();

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(100), live.next()).await;
        assert!(result.is_err(), "other aggregate types must be filtered out");
    }

    #[tokio::test]
    async fn test_replay_delivers_history_with_sync_flag() {
        let store = InMemoryEventStore::new();

        store.append(&sample_event("v-1"), None).await.unwrap();
        store
            .append(&sample_event("v-2"), Some("vehicles"))
            .await
            .unwrap();

        let deliveries: Vec<EventDelivery> =
            store.replay(&["Vehicle"]).await.unwrap().collect().await;

        // Replay includes auto-acknowledged events too
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| d.sync));
        assert_eq!(deliveries[0].event.aggregate_id, "v-1");
        assert_eq!(deliveries[1].event.aggregate_id, "v-2");
    }

    #[tokio::test]
    async fn test_append_ack_sequences_increase() {
        let store = InMemoryEventStore::new();

        let first = store.append(&sample_event("v-1"), None).await.unwrap();
        let second = store.append(&sample_event("v-2"), None).await.unwrap();

        assert!(second.sequence > first.sequence);
        assert_eq!(store.len(), 2);
    }
}
