use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::adapter::{matches, natural_lookup, unique_values, Collection, DataAdapter, Document, Outcome};
use crate::resource::Schema;

/// Length of a generated record id (12 bytes, hex encoded)
const ID_LEN: usize = 24;

#[derive(Debug, Error, PartialEq, Eq)]
enum StoreFault {
    #[error("unique index violated on '{0}'")]
    UniqueViolation(String),
}

/// In-process document store.
///
/// Collections are created on first write. Unique schema fields are enforced
/// as indexes at write time, independently of the adapter-level pre-check.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object-id style identifier: 4 bytes of seconds, 8 random bytes
    fn generate_id() -> String {
        let seconds = Utc::now().timestamp() as u32;
        let random = Uuid::new_v4().simple().to_string();
        format!("{:08x}{}", seconds, &random[..ID_LEN - 8])
    }

    /// First unique field in `data` already held by another record
    async fn find_conflict(&self, collection: Collection<'_>, data: &Document, exclude: Option<&str>) -> Option<String> {
        let collections = self.collections.read().await;
        let records = collections.get(collection.name)?;
        conflicting_field(records, collection.schema, data, exclude)
    }

    async fn insert(&self, collection: Collection<'_>, record: Document) -> Result<(), StoreFault> {
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.name.to_string()).or_default();
        if let Some(field) = conflicting_field(records, collection.schema, &record, None) {
            return Err(StoreFault::UniqueViolation(field));
        }
        records.push(record);
        Ok(())
    }
}

fn conflicting_field(records: &[Document], schema: &Schema, data: &Document, exclude: Option<&str>) -> Option<String> {
    for (field, value) in unique_values(schema, data) {
        let taken = records.iter().any(|record| {
            record.get(field) == Some(value) && record_id(record) != exclude
        });
        if taken {
            return Some(field.to_string());
        }
    }
    None
}

fn record_id(record: &Document) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl DataAdapter for MemoryAdapter {
    fn is_valid_id(&self, id: &str) -> bool {
        id.len() == ID_LEN && id.chars().all(|c| c.is_ascii_hexdigit())
    }

    async fn find_one(&self, collection: Collection<'_>, id: Option<&str>, filter: Document) -> Outcome {
        let collections = self.collections.read().await;
        let records = collections.get(collection.name).map(Vec::as_slice).unwrap_or(&[]);

        let found = match id.filter(|id| self.is_valid_id(id)) {
            Some(id) => records.iter().find(|record| record_id(record) == Some(id)),
            None => match natural_lookup(collection, id, filter) {
                Some(filter) => records.iter().find(|record| matches(record, &filter)),
                None => None,
            },
        };

        match found {
            Some(record) => Outcome::Found(Value::Object(record.clone())),
            None => Outcome::NotFound,
        }
    }

    async fn find_many(&self, collection: Collection<'_>, filter: Document) -> Outcome {
        let collections = self.collections.read().await;
        let records = collections
            .get(collection.name)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches(record, &filter))
                    .cloned()
                    .map(Value::Object)
                    .collect()
            })
            .unwrap_or_default();
        Outcome::FoundMany(records)
    }

    async fn count(&self, collection: Collection<'_>, filter: Document) -> Outcome {
        let collections = self.collections.read().await;
        let count = collections
            .get(collection.name)
            .map(|records| records.iter().filter(|record| matches(record, &filter)).count())
            .unwrap_or(0);
        Outcome::Count(count as u64)
    }

    async fn create(&self, collection: Collection<'_>, data: Document) -> Outcome {
        // Nothing the schema stores was supplied; defaults alone do not count
        if !data.keys().any(|key| collection.schema.has_field(key)) {
            return Outcome::Duplicate(None);
        }

        let mut record = collection.schema.shape(&data, true);
        if let Some(field) = self.find_conflict(collection, &record, None).await {
            return Outcome::Duplicate(Some(field));
        }

        let now = Value::String(Utc::now().to_rfc3339());
        let id = Self::generate_id();
        record.insert("id".to_string(), Value::String(id.clone()));
        record.insert("created_at".to_string(), now.clone());
        record.insert("updated_at".to_string(), now);

        match self.insert(collection, record.clone()).await {
            Ok(()) => {
                debug!("Created {} record {}", collection.name, id);
                Outcome::Found(Value::Object(record))
            }
            Err(StoreFault::UniqueViolation(field)) => Outcome::Duplicate(Some(field)),
        }
    }

    async fn update(&self, collection: Collection<'_>, id: &str, data: Document) -> Outcome {
        if !self.is_valid_id(id) {
            return Outcome::NotFound;
        }

        let changes = collection.schema.shape(&data, false);
        if let Some(field) = self.find_conflict(collection, &changes, Some(id)).await {
            return Outcome::Duplicate(Some(field));
        }

        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection.name) else {
            return Outcome::NotFound;
        };

        // A conflicting write may have landed between the pre-check and this lock
        if let Some(field) = conflicting_field(records, collection.schema, &changes, Some(id)) {
            return Outcome::Duplicate(Some(field));
        }

        let Some(record) = records.iter_mut().find(|record| record_id(record) == Some(id)) else {
            return Outcome::NotFound;
        };

        let modified = changes.iter().any(|(key, value)| record.get(key) != Some(value));
        if !modified {
            return Outcome::NotFound;
        }

        for (key, value) in changes {
            record.insert(key, value);
        }
        record.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));

        debug!("Updated {} record {}", collection.name, id);
        Outcome::Found(Value::Object(record.clone()))
    }

    async fn delete(&self, collection: Collection<'_>, id: &str) -> Outcome {
        if !self.is_valid_id(id) {
            return Outcome::NotFound;
        }

        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection.name) else {
            return Outcome::NotFound;
        };

        match records.iter().position(|record| record_id(record) == Some(id)) {
            Some(index) => {
                let record = records.remove(index);
                debug!("Deleted {} record {}", collection.name, id);
                Outcome::Found(Value::Object(record))
            }
            None => Outcome::NotFound,
        }
    }
}
