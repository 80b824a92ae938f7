// handlers/protected/resource.rs - The generic resource pipeline
//
// Every resource endpoint runs the same stages in the same order:
//   resolve resource + verb (404) -> authorize role (401) -> merge payload
//   -> validate (400) -> dispatch to the data adapter -> render outcome
// Nothing reaches the adapter unless every earlier stage passed.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Extension,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::auth::roles;
use crate::database::{Document, Outcome};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::types::Endpoint;
use crate::validation;

type QueryParams = Result<Query<HashMap<String, String>>, QueryRejection>;
type Caller = Option<Extension<AuthUser>>;

/// GET /:resource - list records matching the query
pub async fn list(
    State(state): State<AppState>,
    user: Caller,
    Path(resource): Path<String>,
    query: QueryParams,
) -> Result<Outcome, ApiError> {
    run(&state, user, &resource, Endpoint::List, None, query, None, Bytes::new()).await
}

/// POST /:resource - create a record
pub async fn create(
    State(state): State<AppState>,
    user: Caller,
    Path(resource): Path<String>,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Outcome, ApiError> {
    run(&state, user, &resource, Endpoint::Create, None, query, content_type(&headers), body).await
}

/// GET /:resource/count - count records matching the query
pub async fn count(
    State(state): State<AppState>,
    user: Caller,
    Path(resource): Path<String>,
    query: QueryParams,
) -> Result<Outcome, ApiError> {
    run(&state, user, &resource, Endpoint::Count, None, query, None, Bytes::new()).await
}

/// GET /:resource/:id - fetch one record by id (or natural key)
pub async fn read(
    State(state): State<AppState>,
    user: Caller,
    Path((resource, id)): Path<(String, String)>,
    query: QueryParams,
) -> Result<Outcome, ApiError> {
    run(&state, user, &resource, Endpoint::Read, Some(id), query, None, Bytes::new()).await
}

/// PATCH /:resource/:id - update one record
pub async fn update(
    State(state): State<AppState>,
    user: Caller,
    Path((resource, id)): Path<(String, String)>,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Outcome, ApiError> {
    run(&state, user, &resource, Endpoint::Update, Some(id), query, content_type(&headers), body).await
}

/// DELETE /:resource/:id - remove one record
pub async fn delete(
    State(state): State<AppState>,
    user: Caller,
    Path((resource, id)): Path<(String, String)>,
    query: QueryParams,
) -> Result<Outcome, ApiError> {
    run(&state, user, &resource, Endpoint::Delete, Some(id), query, None, Bytes::new()).await
}

#[allow(clippy::too_many_arguments)]
async fn run(
    state: &AppState,
    user: Caller,
    resource: &str,
    endpoint: Endpoint,
    id: Option<String>,
    query: QueryParams,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<Outcome, ApiError> {
    // The auth layer always inserts a caller; a missing one is never trusted
    let Some(Extension(user)) = user else {
        warn!("No caller context on {} {}", endpoint.verb().as_str(), resource);
        return Err(ApiError::Unauthorized);
    };

    let policy = state.registry.policy(resource, endpoint)?;
    debug!("Resolved {:?} on resource '{}'", endpoint, policy.resource.name);

    if !roles::authorize(&user.role, policy.roles()) {
        warn!(
            "Role '{}' may not {} resource '{}'",
            user.role,
            endpoint.verb().as_str(),
            policy.resource.name
        );
        return Err(ApiError::Unauthorized);
    }

    let Query(query) = query.map_err(|e| {
        debug!("Rejected query string: {}", e);
        ApiError::BadRequest
    })?;
    let body = parse_body(content_type, &body)?;
    let payload = merge_payload(body, id, query);

    let mut data = validation::validate(&policy.rules(), &payload)?;
    debug!("Validated payload with {} field(s)", data.len());

    let collection = policy.collection();
    let adapter = &state.adapter;
    let outcome = match endpoint {
        Endpoint::List => adapter.find_many(collection, data).await,
        Endpoint::Count => adapter.count(collection, data).await,
        Endpoint::Create => adapter.create(collection, data).await,
        Endpoint::Read => {
            let id = take_id(&mut data)?;
            adapter.find_one(collection, Some(&id), data).await
        }
        Endpoint::Update => {
            let id = take_id(&mut data)?;
            adapter.update(collection, &id, data).await
        }
        Endpoint::Delete => {
            let id = take_id(&mut data)?;
            adapter.delete(collection, &id).await
        }
    };

    debug!("{:?} on '{}' finished with {}", endpoint, policy.resource.name, outcome_kind(&outcome));
    Ok(outcome)
}

/// Body fields, overlaid by the path id, overlaid by query parameters
fn merge_payload(
    body: Document,
    id: Option<String>,
    query: HashMap<String, String>,
) -> Document {
    let mut payload = body;

    if let Some(id) = id {
        payload.insert("id".to_string(), Value::String(id));
    }
    for (key, value) in query {
        payload.insert(key, Value::String(value));
    }

    payload
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok())
}

fn is_form(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

/// An empty body is an empty object. Forms decode to string fields; anything
/// else must be a JSON object.
fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    if is_form(content_type) {
        return match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            Ok(pairs) => Ok(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect()),
            Err(e) => {
                debug!("Rejected malformed form body: {}", e);
                Err(ApiError::BadRequest)
            }
        };
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            debug!("Rejected non-object request body");
            Err(ApiError::BadRequest)
        }
        Err(e) => {
            debug!("Rejected malformed request body: {}", e);
            Err(ApiError::BadRequest)
        }
    }
}

/// Single-record endpoints always carry a validated `id`
fn take_id(data: &mut Document) -> Result<String, ApiError> {
    match data.remove("id") {
        Some(Value::String(id)) => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

fn outcome_kind(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Found(_) => "found",
        Outcome::FoundMany(_) => "found many",
        Outcome::Count(_) => "count",
        Outcome::NotFound => "not found",
        Outcome::Duplicate(_) => "duplicate",
        Outcome::StoreError => "store error",
    }
}
