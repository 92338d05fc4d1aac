//! Casbin policy adapter and model store backed by a document store.
//!
//! # Purpose
//! Persists Casbin policy rules as flat documents and the Casbin model text as
//! one named document, on top of any [`docstore::DocumentStore`] backend.
//!
//! # How it fits
//! An application opens a store, hydrates or saves the model once at startup
//! with [`load_model`]/[`save_model`], then hands a [`DocStoreAdapter`] to a
//! `casbin::Enforcer`, which drives it as policies change.
//!
//! # Key invariants
//! - Rule rows hold `p_type` plus six fields; the first empty field ends the
//!   rule on load.
//! - Model text is parsed before it is written; invalid text never reaches the
//!   store.
//! - [`Config`] scopes both the adapter and the model store, so namespaces are
//!   fully isolated from each other.
//!
//! # Examples
//! ```rust,no_run
//! use casbin::{CoreApi, Enforcer};
//! use casbin_docstore::{Config, DocStoreAdapter, load_model};
//! use docstore::memory::InMemoryStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let config = Config::new("casbin", "tenant-a");
//! let model = load_model(store.as_ref(), &config).await?;
//! let adapter = DocStoreAdapter::with_config(store.clone(), config);
//! let enforcer = Enforcer::new(model, adapter).await?;
//! assert!(!enforcer.enforce(("alice", "data1", "read"))?);
//! # Ok(())
//! # }
//! ```
//!
//! # Common pitfalls
//! - The store handle is not closed on drop; call [`DocStoreAdapter::close`]
//!   or close the store directly on shutdown.

mod adapter;
mod config;
mod errors;
mod model;
mod rule;

pub use adapter::DocStoreAdapter;
pub use config::{Config, DEFAULT_COLLECTION};
pub use errors::{DocStoreError, DocStoreResult};
pub use model::{
    MODEL_KEY, ModelDocument, load_model, load_model_text, parse_model, save_model,
    save_model_text,
};
pub use rule::{FIELD_NAMES, MAX_FIELDS, PTYPE_FIELD, RuleRow};
