//! Domain event construction and messaging constants

use event_store::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Aggregate type of the command-driven vehicles collection
pub const VEHICLES_AGGREGATE: &str = "Vehicles";
/// Aggregate type of individually generated vehicles
pub const VEHICLE_AGGREGATE: &str = "Vehicle";
/// Event type appended for every generated vehicle
pub const VEHICLE_GENERATED_EVENT: &str = "Generated";

/// Reserved actor identity for events produced without a human invoker
pub const SYSTEM_USER: &str = "SYSTEM";

/// Broadcast topic carrying materialized-view updates for command mutations
pub const MATERIALIZED_VIEW_TOPIC: &str = "gateway.materialized-view.updates";
/// Message type used on the materialized-view topic
pub const MATERIALIZED_VIEW_MESSAGE: &str = "GeneratorVehiclesModified";

/// Dedicated broadcast topic for generated vehicles, distinct from the
/// materialized-view topic used by commands
pub const VEHICLE_GENERATED_TOPIC: &str = "fleet.vehicles.generated";
/// Message type used on the generated-vehicles topic
pub const VEHICLE_GENERATED_MESSAGE: &str = "VehicleGenerated";

/// Kind of mutation recorded by an aggregate-modified event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationType {
    Create,
    UpdateMerge,
    UpdateReplace,
    Delete,
}

impl ModificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationType::Create => "CREATE",
            ModificationType::UpdateMerge => "UPDATE_MERGE",
            ModificationType::UpdateReplace => "UPDATE_REPLACE",
            ModificationType::Delete => "DELETE",
        }
    }
}

/// Build the event recording a command-driven mutation
///
/// Pure apart from the wall-clock timestamp: the payload is embedded under
/// `data` together with the modification kind, and the event type is derived
/// from the aggregate type (`<AggregateType>Modified`, payload version 1).
pub fn build_aggregate_modified_event(
    mod_type: ModificationType,
    aggregate_type: &str,
    aggregate_id: &str,
    user: &str,
    payload: &Value,
) -> Event {
    let mut data = serde_json::Map::new();
    data.insert(
        "modType".to_string(),
        Value::String(mod_type.as_str().to_string()),
    );
    if let Value::Object(fields) = payload {
        for (key, value) in fields {
            data.insert(key.clone(), value.clone());
        }
    }

    Event::new(
        aggregate_type,
        aggregate_id,
        format!("{aggregate_type}Modified"),
        1,
        user,
        Value::Object(data),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modification_type_wire_names() {
        assert_eq!(serde_json::to_value(ModificationType::Create).unwrap(), json!("CREATE"));
        assert_eq!(
            serde_json::to_value(ModificationType::UpdateMerge).unwrap(),
            json!("UPDATE_MERGE")
        );
        assert_eq!(
            serde_json::to_value(ModificationType::UpdateReplace).unwrap(),
            json!("UPDATE_REPLACE")
        );
        assert_eq!(serde_json::to_value(ModificationType::Delete).unwrap(), json!("DELETE"));
    }

    #[test]
    fn test_build_aggregate_modified_event() {
        let payload = json!({"id": "v-1", "name": "Truck-A", "active": false});

        let event = build_aggregate_modified_event(
            ModificationType::Create,
            VEHICLES_AGGREGATE,
            "v-1",
            "alice",
            &payload,
        );

        assert_eq!(event.aggregate_type, "Vehicles");
        assert_eq!(event.aggregate_id, "v-1");
        assert_eq!(event.event_type, "VehiclesModified");
        assert_eq!(event.event_type_version, 1);
        assert_eq!(event.user, "alice");
        assert_eq!(event.data.get("modType"), Some(&json!("CREATE")));
        assert_eq!(event.data.get("name"), Some(&json!("Truck-A")));
    }

    #[test]
    fn test_delete_event_carries_only_mod_type() {
        let event = build_aggregate_modified_event(
            ModificationType::Delete,
            VEHICLES_AGGREGATE,
            "v-1",
            "alice",
            &json!({}),
        );

        assert_eq!(event.data, json!({"modType": "DELETE"}));
    }
}
