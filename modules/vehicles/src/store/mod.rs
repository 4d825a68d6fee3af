//! Materialized-view storage seam
//!
//! The service consumes storage through this narrow trait; real database
//! mechanics (query planning, pagination, sorting) live behind it. An
//! in-memory implementation ships for dev/test, config-swapped the same way
//! the messaging backends are.

mod memory;

pub use memory::InMemoryVehicleStore;

use crate::models::{PageInput, SortInput, VehicleFilter};
use async_trait::async_trait;

/// A stored entity: a JSON object keyed by its `id` field
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Errors surfaced by the storage seam
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Distinguished transient condition; re-raised to callers for retry
    #[error("storage timeout: {0}")]
    Timeout(String),

    /// The target identity already exists. Structural, so callers can treat
    /// idempotent re-insertion as success instead of matching error codes.
    #[error("duplicate id: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// How `update` applies its field set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Set-union of the given fields onto the existing document
    Merge,
    /// Full document overwrite
    Replace,
}

/// Document store holding the vehicles materialized view
///
/// Single-document atomicity is assumed from the backend; nothing here
/// requires cross-document transactions.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    /// Fetch one entity; both id and organization id must match, otherwise
    /// the result is empty (existence must not leak across organizations)
    async fn get(&self, id: &str, organization_id: Option<&str>)
        -> StoreResult<Option<Document>>;

    /// List entities matching the filter, projected to listing-relevant
    /// fields (id, name, active)
    async fn list(
        &self,
        filter: &VehicleFilter,
        page: &PageInput,
        sort: Option<&SortInput>,
    ) -> StoreResult<Vec<Document>>;

    /// Count entities matching the filter
    async fn count(&self, filter: &VehicleFilter) -> StoreResult<u64>;

    /// Insert a new entity with audit metadata stamped for `actor`
    ///
    /// Fails with `StoreError::Duplicate` when the id already exists.
    async fn create(&self, id: &str, fields: &Document, actor: &str) -> StoreResult<Document>;

    /// Update an existing entity; `None` when the id is unknown
    async fn update(
        &self,
        id: &str,
        fields: &Document,
        actor: &str,
        mode: UpdateMode,
    ) -> StoreResult<Option<Document>>;

    /// Delete all matching documents in one operation; true when at least
    /// one document was actually removed
    async fn delete_many(&self, ids: &[String]) -> StoreResult<bool>;

    /// Insert-or-update used only by recovery replay; idempotent, stamps no
    /// metadata and applies the fields verbatim
    async fn recovery_upsert(&self, id: &str, fields: &Document) -> StoreResult<()>;
}
