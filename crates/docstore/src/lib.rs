//! Key/value document store used to persist authorization data.
//!
//! # Purpose
//! Provides a small, Datastore-shaped storage contract: documents are JSON
//! property maps addressed by a [`Key`] (namespace, kind, name-or-id), read by
//! key or by equality-filtered [`Query`], and written either one at a time or
//! as an atomic [`Transaction`].
//!
//! # Backends
//! - [`memory::InMemoryStore`]: process-local, for tests and local development.
//! - [`postgres::PostgresStore`]: durable, backed by a single `documents` table.
//!
//! # Resource handling
//! Store handles are opened explicitly and closed explicitly with
//! [`DocumentStore::close`]. Once closed, every operation fails with
//! [`StoreError::Closed`]. Dropping a handle does not perform network cleanup.
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub mod config;
pub mod key;
pub mod memory;
pub mod postgres;
pub mod query;

pub use config::PostgresConfig;
pub use key::{Key, KeyId};
pub use query::{Mutation, Query, Transaction};

/// Property map stored for each document.
pub type Properties = serde_json::Map<String, Value>;

/// A stored document together with its resolved key.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: Key,
    pub properties: Properties,
}

impl Entity {
    pub fn new(key: Key, properties: Properties) -> Self {
        Self { key, properties }
    }

    /// Deserialize the property map into a typed document.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(Value::Object(self.properties.clone())).map_err(|err| {
            StoreError::Unexpected(anyhow::anyhow!("decode document {}: {err}", self.key))
        })
    }
}

/// Serialize a typed document into a property map.
///
/// # Errors
/// - The value fails to serialize, or serializes to something other than a
///   JSON object.
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Properties> {
    match serde_json::to_value(value)? {
        Value::Object(properties) => Ok(properties),
        other => Err(StoreError::Unexpected(anyhow::anyhow!(
            "document must serialize to an object, got {other}"
        ))),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("store is closed")]
    Closed,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::PoolClosed => StoreError::Closed,
            other => StoreError::Unexpected(other.into()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage contract shared by every backend.
///
/// Writes to an incomplete key allocate a numeric id; the resolved key is
/// returned. Deleting a key that does not exist succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &Key) -> StoreResult<Entity>;
    async fn put(&self, key: Key, properties: Properties) -> StoreResult<Key>;
    async fn delete(&self, key: &Key) -> StoreResult<()>;
    async fn query(&self, query: &Query) -> StoreResult<Vec<Entity>>;

    /// Apply every mutation in `tx` atomically.
    ///
    /// Returns the resolved keys of the `Put` mutations, in order.
    async fn commit(&self, tx: Transaction) -> StoreResult<Vec<Key>>;

    async fn close(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        text: String,
    }

    #[test]
    fn encode_rejects_non_objects() {
        let err = encode(&"plain").expect_err("string is not a document");
        assert!(err.to_string().contains("object"));
    }

    #[test]
    fn entity_decodes_typed_document() {
        let note = Note {
            text: "hello".to_string(),
        };
        let entity = Entity::new(Key::name("notes", "n1"), encode(&note).expect("encode"));
        assert_eq!(entity.decode::<Note>().expect("decode"), note);
    }

    #[test]
    fn sqlx_errors_map_to_store_errors() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Closed
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unexpected(_)
        ));
    }
}
