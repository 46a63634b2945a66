//! Document store contract.
//!
//! The application never talks to a database directly: everything it persists
//! lives in a hierarchical collection/document store addressed by
//! slash-separated paths that alternate collection and document segments:
//!
//! ```text
//! projects/{projectId}                      project document
//! projects/{projectId}/members/{memberId}   member documents
//! projects/{projectId}/settings/approvals   approval configuration record
//! ```
//!
//! Two backends implement [`DocumentStore`]: [`PgStore`] keeps every document
//! as a JSONB row in Postgres, [`MemoryStore`] keeps them in a map and backs
//! the tests and the `STORE_BACKEND=memory` mode.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde_json::{Map, Value};
use std::fmt;

/// Key of the sentinel object that asks the store to stamp its own time.
const SERVER_TIMESTAMP_KEY: &str = ".sv";

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    InvalidPath(String),
    Db(sqlx::Error),
    Json(serde_json::Error),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(path) => write!(f, "Document not found: {path}"),
            StoreError::InvalidPath(path) => write!(f, "Invalid document path: {path}"),
            StoreError::Db(e) => write!(f, "Database error: {e}"),
            StoreError::Json(e) => write!(f, "JSON error: {e}"),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Db(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

/// A stored document: its id (last path segment), full path and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub data: Value,
}

impl Document {
    /// Deserialize the document body into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Field filter for [`DocumentStore::query`]. Only top-level fields are addressable.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    ArrayContains(String, Value),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn array_contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::ArrayContains(field.to_string(), value.into())
    }

    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => data.get(field) == Some(value),
            Filter::ArrayContains(field, value) => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document. Absence is `Ok(None)`, not an error.
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;

    /// All direct children of a collection, ordered by document id.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Direct children of a collection that match `filter`, ordered by document id.
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Add a document under a store-assigned id; returns that id.
    async fn insert(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    /// Create or fully replace the document at `path`.
    async fn set(&self, path: &str, data: Value) -> Result<(), StoreError>;

    /// Shallow-merge top-level fields into an existing document.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Append each value to the array `field` unless already present.
    async fn array_union(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError>;

    /// Remove every occurrence of each value from the array `field`.
    async fn array_remove(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError>;
}

/// Placeholder value resolved to the store's clock when the document is written.
pub fn server_timestamp() -> Value {
    let mut sentinel = Map::new();
    sentinel.insert(SERVER_TIMESTAMP_KEY.to_string(), Value::String("timestamp".to_string()));
    Value::Object(sentinel)
}

fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get(SERVER_TIMESTAMP_KEY).and_then(Value::as_str) == Some("timestamp"))
}

/// Replace top-level server-timestamp sentinels with the current UTC time.
pub(crate) fn resolve_server_timestamps(data: &mut Value) {
    if let Value::Object(fields) = data {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        for value in fields.values_mut() {
            if is_server_timestamp(value) {
                *value = Value::String(now.clone());
            }
        }
    }
}

/// Split a document path into (collection, id). Document paths have an even
/// number of non-empty segments.
pub fn split_path(path: &str) -> Result<(String, String), StoreError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 || segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let (collection, id) = path
        .rsplit_once('/')
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    Ok((collection.to_string(), id.to_string()))
}

/// Collections have an odd number of non-empty segments.
pub fn validate_collection(collection: &str) -> Result<(), StoreError> {
    let segments: Vec<&str> = collection.split('/').collect();
    if segments.len() % 2 != 1 || segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(collection.to_string()));
    }
    Ok(())
}

/// Random 20-character hex id for store-assigned documents.
pub(crate) fn generate_document_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 10] = rng.random();
    hex::encode(bytes)
}

pub(crate) fn merge_fields(data: &mut Value, fields: Map<String, Value>) {
    if !data.is_object() {
        *data = Value::Object(Map::new());
    }
    if let Value::Object(existing) = data {
        existing.extend(fields);
    }
}

pub(crate) fn apply_array_union(data: &mut Value, field: &str, values: Vec<Value>) {
    let items = array_field_mut(data, field);
    for value in values {
        if !items.contains(&value) {
            items.push(value);
        }
    }
}

pub(crate) fn apply_array_remove(data: &mut Value, field: &str, values: &[Value]) {
    let items = array_field_mut(data, field);
    items.retain(|item| !values.contains(item));
}

/// Borrow `field` as an array, replacing a missing or non-array value with `[]`.
fn array_field_mut<'a>(data: &'a mut Value, field: &str) -> &'a mut Vec<Value> {
    if !data.is_object() {
        *data = Value::Object(Map::new());
    }
    let Value::Object(fields) = data else {
        unreachable!("document body was just normalized to an object");
    };
    let slot = fields.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("field was just normalized to an array"),
    }
}
