//! Persist the Casbin model definition as a single document.
//!
//! The model text lives at the name key [`MODEL_KEY`] inside the configured
//! collection and namespace, next to the rule rows. Text is parsed before it is
//! written, so the store never holds a model the engine cannot load.
use crate::config::Config;
use crate::errors::{DocStoreError, DocStoreResult};
use casbin::{DefaultModel, Model};
use docstore::{DocumentStore, Key, StoreError, Transaction, encode};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MODEL_KEY: &str = "conf";

/// Sections every usable model defines.
const REQUIRED_SECTIONS: [&str; 4] = ["r", "p", "e", "m"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDocument {
    pub text: String,
}

fn model_key(config: &Config) -> Key {
    Key::name(config.collection(), MODEL_KEY).with_namespace(&config.namespace)
}

/// Parse model text, rejecting text that lacks a required section.
pub async fn parse_model(text: &str) -> DocStoreResult<DefaultModel> {
    let model = DefaultModel::from_str(text)
        .await
        .map_err(|err| DocStoreError::Validation(err.to_string()))?;
    let sections = model.get_model();
    if let Some(missing) = REQUIRED_SECTIONS
        .iter()
        .find(|sec| !sections.contains_key(**sec))
    {
        return Err(DocStoreError::Validation(format!(
            "missing required section `{missing}`"
        )));
    }
    Ok(model)
}

/// Read a model file and store it. See [`save_model_text`].
pub async fn save_model(
    store: &dyn DocumentStore,
    path: impl AsRef<Path>,
    config: &Config,
) -> DocStoreResult<()> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    save_model_text(store, &text, config).await
}

/// Validate `text` and overwrite the model document with it.
///
/// # Errors
/// - [`DocStoreError::Validation`] if the text does not parse; nothing is
///   written in that case.
/// - [`DocStoreError::Store`] if the commit fails.
pub async fn save_model_text(
    store: &dyn DocumentStore,
    text: &str,
    config: &Config,
) -> DocStoreResult<()> {
    parse_model(text).await?;
    let document = ModelDocument {
        text: text.to_string(),
    };
    let mut tx = Transaction::new();
    tx.put(model_key(config), encode(&document)?);
    store.commit(tx).await?;
    tracing::debug!(
        collection = config.collection(),
        namespace = %config.namespace,
        bytes = text.len(),
        "saved model"
    );
    Ok(())
}

async fn fetch_text(store: &dyn DocumentStore, config: &Config) -> DocStoreResult<String> {
    let key = model_key(config);
    let entity = match store.get(&key).await {
        Ok(entity) => entity,
        Err(StoreError::NotFound(_)) => {
            return Err(DocStoreError::NotFound(format!("model document {key}")));
        }
        Err(err) => return Err(err.into()),
    };
    let document: ModelDocument = entity.decode()?;
    Ok(document.text)
}

/// Stored model text, validated but returned as-is.
pub async fn load_model_text(store: &dyn DocumentStore, config: &Config) -> DocStoreResult<String> {
    let text = fetch_text(store, config).await?;
    parse_model(&text).await?;
    Ok(text)
}

/// Fetch and parse the stored model.
///
/// # Errors
/// - [`DocStoreError::NotFound`] if no model was saved under `config`.
/// - [`DocStoreError::Validation`] if the stored text no longer parses.
pub async fn load_model(store: &dyn DocumentStore, config: &Config) -> DocStoreResult<DefaultModel> {
    let text = fetch_text(store, config).await?;
    let model = parse_model(&text).await?;
    tracing::debug!(
        collection = config.collection(),
        namespace = %config.namespace,
        "loaded model"
    );
    Ok(model)
}
