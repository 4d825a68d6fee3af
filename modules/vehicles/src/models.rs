//! Wire-facing data shapes for the vehicles aggregate
//!
//! The gateway speaks camelCase JSON; every shape here serializes that way.
//! The materialized view itself is document-oriented: entities live in the
//! store as JSON objects keyed by id, which is what gives merge, replace and
//! recovery-upsert their field-map semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input payload for creating or replacing a vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Defaults to false when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Listing filter; all fields combine conjunctively
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleFilter {
    /// Case-insensitive substring match on the entity name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

fn default_page_size() -> u64 {
    10
}

/// Pagination input for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInput {
    #[serde(default)]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub count: u64,
    /// Total counts are computed by a separate counting operation and only
    /// when explicitly requested
    #[serde(default)]
    pub query_total_result_count: bool,
}

impl Default for PageInput {
    fn default() -> Self {
        Self {
            page: 0,
            count: default_page_size(),
            query_total_result_count: false,
        }
    }
}

/// Sort input; default ordering is creation time descending
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortInput {
    pub field: String,
    #[serde(default)]
    pub asc: bool,
}

/// Audit metadata stamped onto command-created entities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleMetadata {
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl VehicleMetadata {
    /// Fresh metadata for a newly created entity
    pub fn stamp(actor: &str) -> Self {
        let now = Utc::now();
        Self {
            created_by: actor.to_string(),
            created_at: now,
            updated_by: actor.to_string(),
            updated_at: now,
        }
    }
}

/// One page of the vehicles listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleListingPage {
    pub listing: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_total_result_count: Option<u64>,
}

/// `{code, message}` reply shared by delete and generation start/stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub code: u16,
    pub message: String,
}

/// Field values synthesized for one generated vehicle
///
/// The derived identity is a pure function of these values; two syntheses
/// that land on the same values share one aggregate id by design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedVehicle {
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub power_source: String,
    pub hp: u32,
    pub year: u32,
    pub top_speed: u32,
}
