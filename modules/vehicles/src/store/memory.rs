//! In-memory implementation of the VehicleStore trait for testing and development

use super::{Document, StoreError, StoreResult, UpdateMode, VehicleStore};
use crate::models::{PageInput, SortInput, VehicleFilter, VehicleMetadata};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Listing sort path used when no sort input is given
const DEFAULT_SORT_FIELD: &str = "metadata.createdAt";

/// Document store backed by an in-process map
///
/// Suitable for unit tests, local development without Docker, and
/// integration tests that need fast, isolated storage. Query semantics
/// mirror the production document store: case-insensitive name substring
/// filter, dotted-path sorting, skip/limit pagination.
#[derive(Clone, Default)]
pub struct InMemoryVehicleStore {
    docs: Arc<RwLock<HashMap<String, Document>>>,
}

impl InMemoryVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities
    pub fn len(&self) -> usize {
        self.docs.read().expect("store lock poisoned").len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(doc: &Document, filter: &VehicleFilter) -> bool {
        if let Some(needle) = &filter.name {
            let name = doc.get("name").and_then(Value::as_str).unwrap_or_default();
            if !name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(org) = &filter.organization_id {
            if doc.get("organizationId").and_then(Value::as_str) != Some(org.as_str()) {
                return false;
            }
        }
        if let Some(active) = filter.active {
            if doc.get("active").and_then(Value::as_bool) != Some(active) {
                return false;
            }
        }
        true
    }

    /// Resolve a dotted field path (e.g. "metadata.createdAt")
    fn field_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
        let mut current: Option<&Value> = None;
        for (i, segment) in path.split('.').enumerate() {
            current = if i == 0 {
                doc.get(segment)
            } else {
                current?.get(segment)
            };
        }
        current
    }

    fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
            (Some(Value::Number(a)), Some(Value::Number(b))) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            _ => Ordering::Equal,
        }
    }

    fn project_listing(doc: &Document) -> Document {
        let mut projected = Document::new();
        for key in ["id", "name", "active"] {
            if let Some(value) = doc.get(key) {
                projected.insert(key.to_string(), value.clone());
            }
        }
        projected
    }
}

#[async_trait]
impl VehicleStore for InMemoryVehicleStore {
    async fn get(
        &self,
        id: &str,
        organization_id: Option<&str>,
    ) -> StoreResult<Option<Document>> {
        let docs = self.docs.read().expect("store lock poisoned");

        Ok(docs.get(id).and_then(|doc| {
            let doc_org = doc.get("organizationId").and_then(Value::as_str);
            if doc_org == organization_id {
                Some(doc.clone())
            } else {
                None
            }
        }))
    }

    async fn list(
        &self,
        filter: &VehicleFilter,
        page: &PageInput,
        sort: Option<&SortInput>,
    ) -> StoreResult<Vec<Document>> {
        let docs = self.docs.read().expect("store lock poisoned");

        let mut matching: Vec<&Document> =
            docs.values().filter(|doc| Self::matches(doc, filter)).collect();

        let (field, ascending) = match sort {
            Some(sort) => (sort.field.as_str(), sort.asc),
            None => (DEFAULT_SORT_FIELD, false),
        };

        matching.sort_by(|a, b| {
            let ordering =
                Self::compare_values(Self::field_path(a, field), Self::field_path(b, field));
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });

        Ok(matching
            .into_iter()
            .skip((page.page * page.count) as usize)
            .take(page.count as usize)
            .map(Self::project_listing)
            .collect())
    }

    async fn count(&self, filter: &VehicleFilter) -> StoreResult<u64> {
        let docs = self.docs.read().expect("store lock poisoned");

        Ok(docs.values().filter(|doc| Self::matches(doc, filter)).count() as u64)
    }

    async fn create(&self, id: &str, fields: &Document, actor: &str) -> StoreResult<Document> {
        let mut docs = self.docs.write().expect("store lock poisoned");

        if docs.contains_key(id) {
            return Err(StoreError::Duplicate(id.to_string()));
        }

        let mut doc = Document::new();
        doc.insert("id".to_string(), Value::String(id.to_string()));
        for (key, value) in fields {
            doc.insert(key.clone(), value.clone());
        }
        doc.insert(
            "metadata".to_string(),
            serde_json::to_value(VehicleMetadata::stamp(actor))
                .map_err(|e| StoreError::Backend(e.to_string()))?,
        );

        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        id: &str,
        fields: &Document,
        actor: &str,
        mode: UpdateMode,
    ) -> StoreResult<Option<Document>> {
        let mut docs = self.docs.write().expect("store lock poisoned");

        let Some(existing) = docs.get_mut(id) else {
            return Ok(None);
        };

        match mode {
            UpdateMode::Merge => {
                for (key, value) in fields {
                    existing.insert(key.clone(), value.clone());
                }
                let metadata = existing
                    .entry("metadata".to_string())
                    .or_insert_with(|| Value::Object(Document::new()));
                if let Some(metadata) = metadata.as_object_mut() {
                    metadata.insert("updatedBy".to_string(), Value::String(actor.to_string()));
                    metadata.insert(
                        "updatedAt".to_string(),
                        serde_json::to_value(Utc::now())
                            .map_err(|e| StoreError::Backend(e.to_string()))?,
                    );
                }
            }
            UpdateMode::Replace => {
                let mut replacement = Document::new();
                replacement.insert("id".to_string(), Value::String(id.to_string()));
                for (key, value) in fields {
                    replacement.insert(key.clone(), value.clone());
                }
                *existing = replacement;
            }
        }

        Ok(Some(existing.clone()))
    }

    async fn delete_many(&self, ids: &[String]) -> StoreResult<bool> {
        let mut docs = self.docs.write().expect("store lock poisoned");

        let mut any_removed = false;
        for id in ids {
            any_removed |= docs.remove(id).is_some();
        }
        Ok(any_removed)
    }

    async fn recovery_upsert(&self, id: &str, fields: &Document) -> StoreResult<()> {
        let mut docs = self.docs.write().expect("store lock poisoned");

        let doc = docs.entry(id.to_string()).or_insert_with(|| {
            let mut doc = Document::new();
            doc.insert("id".to_string(), Value::String(id.to_string()));
            doc
        });
        for (key, value) in fields {
            doc.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
