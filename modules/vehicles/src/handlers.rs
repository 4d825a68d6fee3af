//! Command and query handlers for the vehicles aggregate
//!
//! Write handlers follow a saga, not a transaction: persist to the view
//! store first, then append the modification event to the durable log, then
//! broadcast the materialized-view update. Persistence failure aborts before
//! logging; a log or broadcast failure after a successful persist is
//! surfaced to the caller even though the entity now exists.

use crate::dispatcher::Invoker;
use crate::error::CrudError;
use crate::events::{
    build_aggregate_modified_event, ModificationType, MATERIALIZED_VIEW_MESSAGE,
    MATERIALIZED_VIEW_TOPIC, VEHICLES_AGGREGATE,
};
use crate::generation::GenerationController;
use crate::models::{PageInput, SortInput, StatusReply, VehicleFilter, VehicleInput, VehicleListingPage};
use crate::store::{Document, UpdateMode, VehicleStore};
use event_bus::EventBus;
use event_store::EventStore;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Shared service state behind every dispatched operation
pub struct VehicleService {
    store: Arc<dyn VehicleStore>,
    event_store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    generation: GenerationController,
    /// Auto-acknowledge key for events this service both produces and consumes
    service_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingArgs {
    #[serde(default)]
    filter_input: Option<VehicleFilter>,
    #[serde(default)]
    pagination_input: Option<PageInput>,
    #[serde(default)]
    sort_input: Option<SortInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetArgs {
    id: String,
    #[serde(default)]
    organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    input: VehicleInput,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    id: String,
    input: Document,
    #[serde(default)]
    merge: bool,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    ids: Vec<String>,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, CrudError> {
    serde_json::from_value(args).map_err(|e| CrudError::InvalidArgs(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, CrudError> {
    serde_json::to_value(value).map_err(|e| CrudError::Internal(e.to_string()))
}

impl VehicleService {
    pub fn new(
        store: Arc<dyn VehicleStore>,
        event_store: Arc<dyn EventStore>,
        bus: Arc<dyn EventBus>,
        service_key: String,
        generation_period: Duration,
    ) -> Self {
        let generation = GenerationController::new(
            store.clone(),
            event_store.clone(),
            bus.clone(),
            generation_period,
        );
        Self {
            store,
            event_store,
            bus,
            generation,
            service_key,
        }
    }

    pub fn generation(&self) -> &GenerationController {
        &self.generation
    }

    /// Paged listing; the total count is a separate operation paid only on
    /// request
    pub async fn vehicles_listing(&self, args: Value) -> Result<Value, CrudError> {
        let args: ListingArgs = parse_args(args)?;
        let filter = args.filter_input.unwrap_or_default();
        let page = args.pagination_input.unwrap_or_default();

        let listing = self
            .store
            .list(&filter, &page, args.sort_input.as_ref())
            .await?;
        let total = if page.query_total_result_count {
            Some(self.store.count(&filter).await?)
        } else {
            None
        };

        to_value(VehicleListingPage {
            listing: listing.into_iter().map(Value::Object).collect(),
            query_total_result_count: total,
        })
    }

    /// Fetch one entity; a missing or cross-organization id yields an empty
    /// object, never an error
    pub async fn vehicle_by_id(&self, args: Value) -> Result<Value, CrudError> {
        let args: GetArgs = parse_args(args)?;

        match self
            .store
            .get(&args.id, args.organization_id.as_deref())
            .await?
        {
            Some(doc) => Ok(Value::Object(doc)),
            None => Ok(Value::Object(Document::new())),
        }
    }

    pub async fn create_vehicle(&self, args: Value, invoker: &Invoker) -> Result<Value, CrudError> {
        let args: CreateArgs = parse_args(args)?;
        let id = Uuid::new_v4().to_string();

        let mut fields = Document::new();
        fields.insert("name".to_string(), Value::String(args.input.name));
        if let Some(description) = args.input.description {
            fields.insert("description".to_string(), Value::String(description));
        }
        if let Some(organization_id) = args.input.organization_id {
            fields.insert("organizationId".to_string(), Value::String(organization_id));
        }
        fields.insert(
            "active".to_string(),
            Value::Bool(args.input.active.unwrap_or(false)),
        );

        let aggregate = self.store.create(&id, &fields, &invoker.username).await?;

        let event = build_aggregate_modified_event(
            ModificationType::Create,
            VEHICLES_AGGREGATE,
            &id,
            &invoker.username,
            &Value::Object(aggregate.clone()),
        );
        self.event_store
            .append(&event, Some(&self.service_key))
            .await?;
        self.publish_view_update(&Value::Object(aggregate.clone()))
            .await?;

        tracing::info!(vehicle_id = %id, actor = %invoker.username, "vehicle created");
        Ok(Value::Object(aggregate))
    }

    pub async fn update_vehicle(&self, args: Value, invoker: &Invoker) -> Result<Value, CrudError> {
        let args: UpdateArgs = parse_args(args)?;
        let (mode, mod_type) = if args.merge {
            (UpdateMode::Merge, ModificationType::UpdateMerge)
        } else {
            (UpdateMode::Replace, ModificationType::UpdateReplace)
        };

        let updated = self
            .store
            .update(&args.id, &args.input, &invoker.username, mode)
            .await?;

        let aggregate = match updated {
            Some(doc) => Value::Object(doc),
            None => Value::Null,
        };

        let event = build_aggregate_modified_event(
            mod_type,
            VEHICLES_AGGREGATE,
            &args.id,
            &invoker.username,
            &aggregate,
        );
        self.event_store
            .append(&event, Some(&self.service_key))
            .await?;
        self.publish_view_update(&aggregate).await?;

        tracing::info!(
            vehicle_id = %args.id,
            actor = %invoker.username,
            mod_type = mod_type.as_str(),
            "vehicle updated"
        );
        Ok(aggregate)
    }

    /// Batch delete: one store operation, then one DELETE event per
    /// requested id (even ids that did not exist) and a single sentinel
    /// broadcast
    pub async fn delete_vehicles(&self, args: Value, invoker: &Invoker) -> Result<Value, CrudError> {
        let args: DeleteArgs = parse_args(args)?;

        let removed = self.store.delete_many(&args.ids).await?;

        for id in &args.ids {
            let event = build_aggregate_modified_event(
                ModificationType::Delete,
                VEHICLES_AGGREGATE,
                id,
                &invoker.username,
                &Value::Object(Document::new()),
            );
            self.event_store
                .append(&event, Some(&self.service_key))
                .await?;
        }

        self.publish_view_update(&serde_json::json!({
            "id": "deleted",
            "name": "",
            "active": false,
            "description": "",
        }))
        .await?;

        let reply = StatusReply {
            code: if removed { 200 } else { 400 },
            message: format!(
                "vehicles with ids {:?} {}",
                args.ids,
                if removed {
                    "have been deleted"
                } else {
                    "not found for deletion"
                }
            ),
        };

        tracing::info!(ids = ?args.ids, removed, actor = %invoker.username, "vehicles deleted");
        to_value(reply)
    }

    pub async fn start_generation(&self) -> Result<Value, CrudError> {
        self.generation
            .start()
            .map_err(|e| CrudError::Domain(e.to_string()))?;

        to_value(StatusReply {
            code: 200,
            message: "Vehicle generation started".to_string(),
        })
    }

    pub async fn stop_generation(&self) -> Result<Value, CrudError> {
        self.generation
            .stop()
            .map_err(|e| CrudError::Domain(e.to_string()))?;

        to_value(StatusReply {
            code: 200,
            message: "Vehicle generation stopped".to_string(),
        })
    }

    async fn publish_view_update(&self, payload: &Value) -> Result<(), CrudError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| CrudError::Internal(e.to_string()))?;
        self.bus
            .publish(MATERIALIZED_VIEW_TOPIC, MATERIALIZED_VIEW_MESSAGE, bytes)
            .await?;
        Ok(())
    }
}
