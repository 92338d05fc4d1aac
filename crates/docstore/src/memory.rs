//! In-memory implementation of the document store.
//!
//! # Purpose
//! Implements [`DocumentStore`] entirely in memory using a `BTreeMap` guarded by
//! `tokio::sync::RwLock`. It exists for:
//! - local development and tests (no external dependencies)
//! - embedding a throwaway policy store in a single process
//!
//! # Durability and consistency
//! - **Not durable**: all documents are lost when the store is dropped.
//! - **Single-process consistency**: reads take the read lock, writes and commits
//!   take the write lock, so a commit is observed entirely or not at all.
//!
//! # Ordering
//! Documents iterate in key order. Allocated ids are monotonic, so documents
//! written through incomplete keys come back in insertion order.
use crate::{
    DocumentStore, Entity, Key, KeyId, Mutation, Properties, Query, StoreError, StoreResult,
    Transaction,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Documents keyed by their complete key.
    documents: Arc<RwLock<BTreeMap<Key, Properties>>>,
    /// Last allocated numeric id; ids start at 1.
    last_id: AtomicI64,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn allocate_id(&self) -> i64 {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Resolve `key` for a write. Explicit ids raise the allocator so a later
    /// incomplete key never lands on an existing document.
    fn resolve_for_write(&self, key: Key) -> StoreResult<Key> {
        key.validate()?;
        if let KeyId::Id(id) = key.id {
            self.last_id.fetch_max(id, Ordering::Relaxed);
        }
        Ok(key.resolve(|| self.allocate_id()))
    }

    fn record_size(documents: &BTreeMap<Key, Properties>) {
        metrics::gauge!("docstore_documents_total", "backend" => "memory")
            .set(documents.len() as f64);
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, key: &Key) -> StoreResult<Entity> {
        self.ensure_open()?;
        key.require_complete()?;
        self.documents
            .read()
            .await
            .get(key)
            .map(|properties| Entity::new(key.clone(), properties.clone()))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: Key, properties: Properties) -> StoreResult<Key> {
        self.ensure_open()?;
        let key = self.resolve_for_write(key)?;
        let mut documents = self.documents.write().await;
        documents.insert(key.clone(), properties);
        Self::record_size(&documents);
        Ok(key)
    }

    async fn delete(&self, key: &Key) -> StoreResult<()> {
        self.ensure_open()?;
        key.require_complete()?;
        let mut documents = self.documents.write().await;
        documents.remove(key);
        Self::record_size(&documents);
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Entity>> {
        self.ensure_open()?;
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|(key, properties)| query.matches(key, properties))
            .map(|(key, properties)| Entity::new(key.clone(), properties.clone()))
            .collect())
    }

    async fn commit(&self, tx: Transaction) -> StoreResult<Vec<Key>> {
        self.ensure_open()?;
        let mutations = tx.into_mutations();
        // Validate up front so a rejected batch leaves no partial writes.
        for mutation in &mutations {
            match mutation {
                Mutation::Put { key, .. } => key.validate()?,
                Mutation::Delete(key) => key.require_complete()?,
            }
        }

        let mut documents = self.documents.write().await;
        let mut written = Vec::new();
        for mutation in mutations {
            match mutation {
                Mutation::Put { key, properties } => {
                    let key = self.resolve_for_write(key)?;
                    documents.insert(key.clone(), properties);
                    written.push(key);
                }
                Mutation::Delete(key) => {
                    documents.remove(&key);
                }
            }
        }
        Self::record_size(&documents);
        metrics::counter!("docstore_commits_total", "backend" => "memory").increment(1);
        Ok(written)
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
