use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::adapter::{natural_lookup, unique_values, Collection, DataAdapter, Document, Outcome};
use super::manager::{DatabaseError, DatabaseManager};
use crate::resource::{ResourceRegistry, Schema};

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const COLUMNS: &str = "id, data, created_at, updated_at";

/// Postgres-backed store: one table per resource, record fields in a JSONB column.
///
/// Unique schema fields get a unique expression index named
/// `{resource}_{field}_key`, which is how write-time violations are traced
/// back to the conflicting field.
#[derive(Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and unique indexes for every registered resource that has a schema
    pub async fn ensure_collections(&self, registry: &ResourceRegistry) -> Result<(), DatabaseError> {
        for resource in registry.iter() {
            let Some(schema) = &resource.schema else { continue };
            let table = DatabaseManager::quote_identifier(&resource.name);

            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                    id UUID PRIMARY KEY, \
                    data JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now())",
                table
            );
            sqlx::query(&ddl).execute(&self.pool).await?;

            for field in schema.unique_fields() {
                let index = format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((data->{}))",
                    DatabaseManager::quote_identifier(&unique_index_name(&resource.name, field)),
                    table,
                    DatabaseManager::quote_literal(field)
                );
                sqlx::query(&index).execute(&self.pool).await?;
            }

            info!("Collection ready: {}", resource.name);
        }
        Ok(())
    }

    async fn find_conflict(
        &self,
        collection: Collection<'_>,
        data: &Document,
        exclude: Option<Uuid>,
    ) -> Result<Option<String>, sqlx::Error> {
        let table = DatabaseManager::quote_identifier(collection.name);

        for (field, value) in unique_values(collection.schema, data) {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE data->{} = $1 AND id IS DISTINCT FROM $2) AS taken",
                table,
                DatabaseManager::quote_literal(field)
            );
            let taken: bool = sqlx::query(&sql)
                .bind(value.clone())
                .bind(exclude)
                .fetch_one(&self.pool)
                .await?
                .try_get("taken")?;
            if taken {
                return Ok(Some(field.to_string()));
            }
        }
        Ok(None)
    }

    async fn try_find_one(&self, collection: Collection<'_>, id: Option<&str>, filter: Document) -> Result<Outcome, sqlx::Error> {
        let table = DatabaseManager::quote_identifier(collection.name);

        let row = match id.and_then(|id| Uuid::parse_str(id).ok()) {
            Some(uuid) => {
                let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, table);
                sqlx::query(&sql).bind(uuid).fetch_optional(&self.pool).await?
            }
            None => match natural_lookup(collection, id, filter) {
                Some(filter) => {
                    let sql = format!("SELECT {} FROM {} WHERE data @> $1 LIMIT 1", COLUMNS, table);
                    sqlx::query(&sql)
                        .bind(Value::Object(filter))
                        .fetch_optional(&self.pool)
                        .await?
                }
                None => None,
            },
        };

        match row {
            Some(row) => Ok(Outcome::Found(row_to_value(&row)?)),
            None => Ok(Outcome::NotFound),
        }
    }

    async fn try_find_many(&self, collection: Collection<'_>, filter: Document) -> Result<Outcome, sqlx::Error> {
        let table = DatabaseManager::quote_identifier(collection.name);
        let Some((filter, id)) = split_id_filter(filter) else {
            return Ok(Outcome::FoundMany(vec![]));
        };

        let sql = format!(
            "SELECT {} FROM {} WHERE data @> $1 AND ($2::uuid IS NULL OR id = $2) ORDER BY created_at",
            COLUMNS, table
        );
        let rows = sqlx::query(&sql)
            .bind(Value::Object(filter))
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let records = rows.iter().map(row_to_value).collect::<Result<Vec<_>, _>>()?;
        Ok(Outcome::FoundMany(records))
    }

    async fn try_count(&self, collection: Collection<'_>, filter: Document) -> Result<Outcome, sqlx::Error> {
        let table = DatabaseManager::quote_identifier(collection.name);
        let Some((filter, id)) = split_id_filter(filter) else {
            return Ok(Outcome::Count(0));
        };

        let sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE data @> $1 AND ($2::uuid IS NULL OR id = $2)",
            table
        );
        let count: i64 = sqlx::query(&sql)
            .bind(Value::Object(filter))
            .bind(id)
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(Outcome::Count(count.max(0) as u64))
    }

    async fn try_create(&self, collection: Collection<'_>, data: Document) -> Result<Outcome, sqlx::Error> {
        if !data.keys().any(|key| collection.schema.has_field(key)) {
            return Ok(Outcome::Duplicate(None));
        }

        let record = collection.schema.shape(&data, true);
        if let Some(field) = self.find_conflict(collection, &record, None).await? {
            return Ok(Outcome::Duplicate(Some(field)));
        }

        let sql = format!(
            "INSERT INTO {} (id, data) VALUES ($1, $2) RETURNING {}",
            DatabaseManager::quote_identifier(collection.name),
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(Value::Object(record))
            .fetch_one(&self.pool)
            .await?;

        debug!("Created {} record", collection.name);
        Ok(Outcome::Found(row_to_value(&row)?))
    }

    async fn try_update(&self, collection: Collection<'_>, id: Uuid, data: Document) -> Result<Outcome, sqlx::Error> {
        let changes = collection.schema.shape(&data, false);
        if let Some(field) = self.find_conflict(collection, &changes, Some(id)).await? {
            return Ok(Outcome::Duplicate(Some(field)));
        }

        // Rows whose data already contains every change are left untouched
        let sql = format!(
            "UPDATE {} SET data = data || $2, updated_at = now() \
             WHERE id = $1 AND NOT (data @> $2) RETURNING {}",
            DatabaseManager::quote_identifier(collection.name),
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(Value::Object(changes))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Outcome::Found(row_to_value(&row)?)),
            None => Ok(Outcome::NotFound),
        }
    }

    async fn try_delete(&self, collection: Collection<'_>, id: Uuid) -> Result<Outcome, sqlx::Error> {
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 RETURNING {}",
            DatabaseManager::quote_identifier(collection.name),
            COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Outcome::Found(row_to_value(&row)?)),
            None => Ok(Outcome::NotFound),
        }
    }
}

fn unique_index_name(table: &str, field: &str) -> String {
    format!("{}_{}_key", table, field)
}

/// Field behind a `{table}_{field}_key` constraint, if the schema knows it
fn field_from_constraint(table: &str, schema: &Schema, constraint: &str) -> Option<String> {
    let field = constraint
        .strip_prefix(table)?
        .strip_prefix('_')?
        .strip_suffix("_key")?;
    schema.has_field(field).then(|| field.to_string())
}

/// Pull an `id` criterion out of a filter. `None` means the id can never match.
fn split_id_filter(mut filter: Document) -> Option<(Document, Option<Uuid>)> {
    match filter.remove("id") {
        None => Some((filter, None)),
        Some(Value::String(id)) => Uuid::parse_str(&id).ok().map(|uuid| (filter, Some(uuid))),
        Some(_) => None,
    }
}

fn row_to_value(row: &PgRow) -> Result<Value, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let data: Value = row.try_get("data")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let mut record = match data {
        Value::Object(map) => map,
        _ => Document::new(),
    };
    record.insert("id".to_string(), Value::String(id.to_string()));
    record.insert("created_at".to_string(), Value::String(created_at.to_rfc3339()));
    record.insert("updated_at".to_string(), Value::String(updated_at.to_rfc3339()));
    Ok(Value::Object(record))
}

/// Downgrade a store error; unique violations become `Duplicate`
fn store_failure(collection: Collection<'_>, operation: &str, err: sqlx::Error) -> Outcome {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let field = db_err
                .constraint()
                .and_then(|constraint| field_from_constraint(collection.name, collection.schema, constraint));
            return Outcome::Duplicate(field);
        }
    }

    error!("{} on '{}' failed: {}", operation, collection.name, err);
    Outcome::StoreError
}

#[async_trait]
impl DataAdapter for PostgresAdapter {
    fn is_valid_id(&self, id: &str) -> bool {
        Uuid::parse_str(id).is_ok()
    }

    async fn find_one(&self, collection: Collection<'_>, id: Option<&str>, filter: Document) -> Outcome {
        self.try_find_one(collection, id, filter)
            .await
            .unwrap_or_else(|e| store_failure(collection, "find_one", e))
    }

    async fn find_many(&self, collection: Collection<'_>, filter: Document) -> Outcome {
        self.try_find_many(collection, filter)
            .await
            .unwrap_or_else(|e| store_failure(collection, "find_many", e))
    }

    async fn count(&self, collection: Collection<'_>, filter: Document) -> Outcome {
        self.try_count(collection, filter)
            .await
            .unwrap_or_else(|e| store_failure(collection, "count", e))
    }

    async fn create(&self, collection: Collection<'_>, data: Document) -> Outcome {
        self.try_create(collection, data)
            .await
            .unwrap_or_else(|e| store_failure(collection, "create", e))
    }

    async fn update(&self, collection: Collection<'_>, id: &str, data: Document) -> Outcome {
        let Ok(id) = Uuid::parse_str(id) else {
            return Outcome::NotFound;
        };
        self.try_update(collection, id, data)
            .await
            .unwrap_or_else(|e| store_failure(collection, "update", e))
    }

    async fn delete(&self, collection: Collection<'_>, id: &str) -> Outcome {
        let Ok(id) = Uuid::parse_str(id) else {
            return Outcome::NotFound;
        };
        self.try_delete(collection, id)
            .await
            .unwrap_or_else(|e| store_failure(collection, "delete", e))
    }
}
