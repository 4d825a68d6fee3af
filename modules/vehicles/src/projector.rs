//! Event projector: turns the persisted event stream into view state
//!
//! One mapping from `(aggregate_type, event_type)` to a handler serves two
//! modes. Live deliveries are processed once for side effects beyond view
//! maintenance; recovery (sync) deliveries replay history to rebuild the
//! view. `VehiclesModified` is recovery-only: on the live path the command
//! handler already wrote the view. Replay is a faithful re-application of
//! exactly what happened — no live-path defaulting is re-derived.

use crate::events::ModificationType;
use crate::store::{Document, StoreError, VehicleStore};
use event_store::retry::{retry_with_backoff, RetryConfig};
use event_store::{Event, EventDelivery};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// Errors raised while applying one event delivery
#[derive(Debug, thiserror::Error)]
pub enum ProjectorError {
    /// The payload version has no decoder; version 0 was never valid
    #[error("event type version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("malformed event data: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Projects vehicle events onto the materialized view
#[derive(Clone)]
pub struct VehicleProjector {
    store: Arc<dyn VehicleStore>,
}

impl VehicleProjector {
    /// Aggregate types this projector consumes from the log
    pub const AGGREGATE_TYPES: &'static [&'static str] = &["Vehicle", "Vehicles"];

    pub fn new(store: Arc<dyn VehicleStore>) -> Self {
        Self { store }
    }

    /// Consume a delivery stream until it ends
    ///
    /// Failed applies are retried with backoff; a delivery that still fails
    /// is logged and skipped so the stream keeps moving (at-least-once
    /// consumption, duplicates are tolerated by the idempotent writes).
    pub async fn run(&self, mut deliveries: BoxStream<'static, EventDelivery>) {
        let retry = RetryConfig::default();

        while let Some(delivery) = deliveries.next().await {
            let outcome =
                retry_with_backoff(|| self.apply(&delivery), &retry, "projector_apply").await;
            if let Err(e) = outcome {
                tracing::error!(
                    aggregate_id = %delivery.event.aggregate_id,
                    event_type = %delivery.event.event_type,
                    error = %e,
                    "dropping event after retries"
                );
            }
        }
    }

    /// Apply one delivery according to the event processor mapping
    pub async fn apply(&self, delivery: &EventDelivery) -> Result<(), ProjectorError> {
        let event = &delivery.event;
        match (event.aggregate_type.as_str(), event.event_type.as_str()) {
            ("Vehicle", "Generated") => self.handle_vehicle_generated(event),
            ("Vehicles", "VehiclesModified") => {
                // Recovery-only: the live view write happened in the handler
                if !delivery.sync {
                    return Ok(());
                }
                self.handle_vehicles_modified(event).await
            }
            _ => {
                tracing::debug!(
                    aggregate_type = %event.aggregate_type,
                    event_type = %event.event_type,
                    "no handler for event, acknowledging"
                );
                Ok(())
            }
        }
    }

    /// Acknowledgment-only: the generating tick already wrote the view
    fn handle_vehicle_generated(&self, event: &Event) -> Result<(), ProjectorError> {
        tracing::debug!(
            aggregate_id = %event.aggregate_id,
            sync = false,
            "vehicle generated event acknowledged"
        );
        Ok(())
    }

    async fn handle_vehicles_modified(&self, event: &Event) -> Result<(), ProjectorError> {
        let (mod_type, fields) = decode_modified(event.event_type_version, &event.data)?;

        if mod_type == ModificationType::Delete {
            // Removing an absent entity is not an error
            self.store
                .delete_many(std::slice::from_ref(&event.aggregate_id))
                .await?;
        } else {
            self.store
                .recovery_upsert(&event.aggregate_id, &fields)
                .await?;
        }

        tracing::info!(
            mod_type = mod_type.as_str(),
            aggregate_id = %event.aggregate_id,
            timestamp = %event.timestamp,
            "materialized view recovered"
        );
        Ok(())
    }
}

/// Explicit mapping from payload version to decoder
///
/// Version 0 is defined as absent: rejecting it is a named error, not an
/// array-bounds artifact. Unknown future versions fail just as loudly.
fn decode_modified(
    version: u32,
    data: &Value,
) -> Result<(ModificationType, Document), ProjectorError> {
    match version {
        0 => Err(ProjectorError::UnsupportedVersion(0)),
        1 => decode_modified_v1(data),
        other => Err(ProjectorError::UnsupportedVersion(other)),
    }
}

/// Version 1: `data` is the entity document plus a `modType` tag
fn decode_modified_v1(data: &Value) -> Result<(ModificationType, Document), ProjectorError> {
    let object = data
        .as_object()
        .ok_or_else(|| ProjectorError::Malformed("data is not an object".to_string()))?;

    let mod_type_value = object
        .get("modType")
        .cloned()
        .ok_or_else(|| ProjectorError::Malformed("missing modType".to_string()))?;
    let mod_type: ModificationType = serde_json::from_value(mod_type_value)
        .map_err(|e| ProjectorError::Malformed(format!("invalid modType: {e}")))?;

    let mut fields = object.clone();
    fields.remove("modType");

    Ok((mod_type, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_zero_is_rejected_by_name() {
        let err = decode_modified(0, &json!({"modType": "CREATE"})).unwrap_err();
        assert!(matches!(err, ProjectorError::UnsupportedVersion(0)));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let err = decode_modified(7, &json!({"modType": "CREATE"})).unwrap_err();
        assert!(matches!(err, ProjectorError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_version_one_strips_mod_type() {
        let (mod_type, fields) = decode_modified(
            1,
            &json!({"modType": "UPDATE_MERGE", "name": "Truck-A", "active": true}),
        )
        .unwrap();

        assert_eq!(mod_type, ModificationType::UpdateMerge);
        assert!(!fields.contains_key("modType"));
        assert_eq!(fields.get("name"), Some(&json!("Truck-A")));
    }

    #[test]
    fn test_missing_mod_type_is_malformed() {
        let err = decode_modified(1, &json!({"name": "Truck-A"})).unwrap_err();
        assert!(matches!(err, ProjectorError::Malformed(_)));
    }
}
