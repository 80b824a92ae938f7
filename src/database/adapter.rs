use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::resource::Schema;

/// A stored record or a payload headed for storage
pub type Document = Map<String, Value>;

/// Tagged result of every data-store operation.
/// Created per request and consumed by the response codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Found(Value),
    FoundMany(Vec<Value>),
    Count(u64),
    NotFound,
    /// Uniqueness conflict, naming the field when it is known
    Duplicate(Option<String>),
    StoreError,
}

/// The collection an operation targets
#[derive(Debug, Clone, Copy)]
pub struct Collection<'a> {
    pub name: &'a str,
    pub schema: &'a Schema,
}

/// Narrow persistence interface the resource router dispatches to.
///
/// Implementations catch every store-level failure and report it as
/// `Outcome::StoreError`; nothing escapes as a panic or an `Err`.
/// They must be safe to share between concurrent requests without any
/// locking on the caller's side.
#[async_trait]
pub trait DataAdapter: Send + Sync {
    /// Whether `id` is syntactically a record identifier for this store
    fn is_valid_id(&self, id: &str) -> bool;

    /// Look up by id when it is well-formed, otherwise by filter
    async fn find_one(&self, collection: Collection<'_>, id: Option<&str>, filter: Document) -> Outcome;

    /// Every record matching `filter`; an empty filter returns the whole collection
    async fn find_many(&self, collection: Collection<'_>, filter: Document) -> Outcome;

    async fn count(&self, collection: Collection<'_>, filter: Document) -> Outcome;

    async fn create(&self, collection: Collection<'_>, data: Document) -> Outcome;

    /// Zero modified records (absent id or unchanged data) is `NotFound`
    async fn update(&self, collection: Collection<'_>, id: &str, data: Document) -> Outcome;

    async fn delete(&self, collection: Collection<'_>, id: &str) -> Outcome;
}

/// Filter used by `find_one` when the id is not a store identifier.
/// The id addresses the schema's natural key when one is declared.
/// Returns `None` when nothing would narrow the lookup down.
pub fn natural_lookup(collection: Collection<'_>, id: Option<&str>, mut filter: Document) -> Option<Document> {
    filter.remove("id");
    if let (Some(key), Some(id)) = (&collection.schema.natural_key, id) {
        filter.insert(key.clone(), Value::String(id.to_string()));
    }
    if filter.is_empty() {
        None
    } else {
        Some(filter)
    }
}

/// Whether `document` carries every key/value pair of `filter`
pub fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

/// Unique fields of `schema` present in `data`, paired with their values
pub fn unique_values<'a>(schema: &'a Schema, data: &'a Document) -> Vec<(&'a str, &'a Value)> {
    schema
        .unique_fields()
        .filter_map(|field| data.get(field).map(|value| (field, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FieldSpec;
    use serde_json::json;

    fn schema(natural_key: Option<&str>) -> Schema {
        let mut schema = Schema::default();
        schema.fields.insert("sku".into(), FieldSpec { unique: true, ..Default::default() });
        schema.fields.insert("name".into(), FieldSpec::default());
        schema.natural_key = natural_key.map(str::to_string);
        schema
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn natural_key_takes_the_path_id() {
        let schema = schema(Some("sku"));
        let collection = Collection { name: "widgets", schema: &schema };
        let filter = natural_lookup(collection, Some("w-1"), doc(json!({ "id": "w-1" }))).unwrap();
        assert_eq!(Value::Object(filter), json!({ "sku": "w-1" }));
    }

    #[test]
    fn lookup_without_criteria_is_none() {
        let schema = schema(None);
        let collection = Collection { name: "widgets", schema: &schema };
        assert!(natural_lookup(collection, Some("abc"), doc(json!({ "id": "abc" }))).is_none());
    }

    #[test]
    fn filter_matching_is_exact() {
        let record = doc(json!({ "sku": "w-1", "name": "gear" }));
        assert!(matches(&record, &Document::new()));
        assert!(matches(&record, &doc(json!({ "name": "gear" }))));
        assert!(!matches(&record, &doc(json!({ "name": "Gear" }))));
    }

    #[test]
    fn unique_values_only_reports_present_fields() {
        let schema = schema(None);
        let data = doc(json!({ "name": "gear" }));
        assert!(unique_values(&schema, &data).is_empty());
        let data = doc(json!({ "sku": "w-1" }));
        assert_eq!(unique_values(&schema, &data), vec![("sku", &json!("w-1"))]);
    }
}
