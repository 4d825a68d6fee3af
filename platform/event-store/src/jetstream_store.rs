//! NATS JetStream implementation of the EventStore trait

use crate::{AppendAck, Event, EventDelivery, EventStore, EventStoreError, EventStoreResult};
use async_nats::jetstream::{
    self,
    consumer::{pull, DeliverPolicy, PullConsumer},
    stream,
};
use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;

/// Header carrying the producer's auto-acknowledge key on the wire.
const ACK_KEY_HEADER: &str = "auto-ack-key";

/// Event log implementation on a NATS JetStream stream
///
/// This is the production implementation. One JetStream stream holds the
/// full event history; events are published to
/// `<subject_prefix>.<aggregate_type>` subjects so consumers can filter by
/// aggregate type. Live consumption uses a pull consumer starting at new
/// messages; replay uses a fresh pull consumer reading from the beginning.
#[derive(Clone)]
pub struct JetStreamEventStore {
    context: jetstream::Context,
    stream_name: String,
    subject_prefix: String,
}

impl JetStreamEventStore {
    /// Connect the log to a JetStream stream, creating it when absent
    ///
    /// # Arguments
    /// * `client` - An already-connected `async_nats::Client`
    /// * `stream_name` - JetStream stream name (e.g. "DOMAIN_EVENTS")
    /// * `subject_prefix` - Subject prefix owned by the stream (e.g. "es.events")
    pub async fn connect(
        client: Client,
        stream_name: &str,
        subject_prefix: &str,
    ) -> EventStoreResult<Self> {
        let context = jetstream::new(client);

        let config = stream::Config {
            name: stream_name.to_string(),
            subjects: vec![format!("{}.>", subject_prefix)],
            max_age: Duration::from_secs(60 * 60 * 24 * 14), // 14 days (reasonable default)
            ..Default::default()
        };

        context
            .get_or_create_stream(config)
            .await
            .map_err(|e| EventStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            context,
            stream_name: stream_name.to_string(),
            subject_prefix: subject_prefix.to_string(),
        })
    }

    fn subject_for(&self, aggregate_type: &str) -> String {
        format!("{}.{}", self.subject_prefix, aggregate_type)
    }

    fn filter_subjects(&self, aggregate_types: &[&str]) -> Vec<String> {
        aggregate_types.iter().map(|t| self.subject_for(t)).collect()
    }

    async fn pull_consumer(
        &self,
        deliver_policy: DeliverPolicy,
        aggregate_types: &[&str],
    ) -> EventStoreResult<PullConsumer> {
        let stream = self
            .context
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| EventStoreError::ConnectionError(e.to_string()))?;

        stream
            .create_consumer(pull::Config {
                deliver_policy,
                filter_subjects: self.filter_subjects(aggregate_types),
                ..Default::default()
            })
            .await
            .map_err(|e| EventStoreError::SubscribeError(e.to_string()))
    }
}

fn decode_entry(msg: &async_nats::jetstream::Message) -> EventStoreResult<(Event, Option<String>)> {
    let event: Event = serde_json::from_slice(&msg.payload)
        .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

    let ack_key = msg
        .headers
        .as_ref()
        .and_then(|h| h.get(ACK_KEY_HEADER))
        .map(|v| v.to_string());

    Ok((event, ack_key))
}

#[async_trait]
impl EventStore for JetStreamEventStore {
    async fn append(&self, event: &Event, ack_key: Option<&str>) -> EventStoreResult<AppendAck> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = ack_key {
            headers.insert(ACK_KEY_HEADER, key);
        }

        let ack = self
            .context
            .publish_with_headers(self.subject_for(&event.aggregate_type), headers, payload.into())
            .await
            .map_err(|e| EventStoreError::AppendError(e.to_string()))?
            .await
            .map_err(|e| EventStoreError::AppendError(e.to_string()))?;

        Ok(AppendAck {
            sequence: ack.sequence,
        })
    }

    async fn subscribe(
        &self,
        consumer_key: &str,
        aggregate_types: &[&str],
    ) -> EventStoreResult<BoxStream<'static, EventDelivery>> {
        let consumer = self
            .pull_consumer(DeliverPolicy::New, aggregate_types)
            .await?;

        let consumer_key = consumer_key.to_string();

        let stream = async_stream::stream! {
            let mut messages = match consumer.messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::error!(error = %e, "event log live consumption failed to start");
                    return;
                }
            };

            while let Some(next) = messages.next().await {
                let msg = match next {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(error = %e, "event log live delivery error");
                        continue;
                    }
                };

                let (event, ack_key) = match decode_entry(&msg) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        tracing::error!(error = %e, "skipping undecodable event");
                        let _ = msg.ack().await;
                        continue;
                    }
                };

                // Ack before handing off; at-least-once is preserved by the
                // consumer-side retry, and a crashed consumer re-reads from
                // its durable cursor on restart.
                if msg.ack().await.is_err() {
                    tracing::warn!("event log ack failed");
                }

                // Auto-acknowledged for the producing consumer
                if ack_key.as_deref() == Some(consumer_key.as_str()) {
                    continue;
                }

                yield EventDelivery { event, sync: false };
            }
        };

        Ok(stream.boxed())
    }

    async fn replay(
        &self,
        aggregate_types: &[&str],
    ) -> EventStoreResult<BoxStream<'static, EventDelivery>> {
        let consumer = self
            .pull_consumer(DeliverPolicy::All, aggregate_types)
            .await?;

        let pending = consumer.cached_info().num_pending;

        let stream = async_stream::stream! {
            let mut messages = match consumer.messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::error!(error = %e, "event log replay failed to start");
                    return;
                }
            };

            let mut remaining = pending;
            while remaining > 0 {
                let msg = match messages.next().await {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "event log replay delivery error");
                        continue;
                    }
                    None => break,
                };
                remaining -= 1;

                let (event, _ack_key) = match decode_entry(&msg) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        tracing::error!(error = %e, "skipping undecodable event in replay");
                        let _ = msg.ack().await;
                        continue;
                    }
                };

                if msg.ack().await.is_err() {
                    tracing::warn!("event log replay ack failed");
                }

                yield EventDelivery { event, sync: true };
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Note: These tests require a running NATS server with JetStream
    // For CI, use InMemoryEventStore tests instead
    // For manual testing: docker run -p 4222:4222 nats:2.10-alpine -js

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_jetstream_append_and_replay() {
        let client = async_nats::connect("nats://localhost:4222")
            .await
            .expect("NATS server must be running on localhost:4222");

        let store = JetStreamEventStore::connect(client, "TEST_EVENTS", "test.es.events")
            .await
            .unwrap();

        let event = Event::new("Vehicle", "v-js-1", "Generated", 1, "SYSTEM", json!({}));
        let ack = store.append(&event, None).await.unwrap();
        assert!(ack.sequence > 0);

        let deliveries: Vec<EventDelivery> =
            store.replay(&["Vehicle"]).await.unwrap().collect().await;
        assert!(!deliveries.is_empty());
        assert!(deliveries.iter().all(|d| d.sync));
    }
}
