use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

pub const DEFAULT_COLLECTION: &str = "casbin";

/// Where policy rows and the model document live.
///
/// `collection` is the document kind; `namespace` partitions one database into
/// independent policy stores. Both the adapter and the model store use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub collection: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
struct ConfigOverride {
    collection: Option<String>,
    namespace: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            namespace: String::new(),
        }
    }
}

impl Config {
    pub fn new(collection: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            namespace: namespace.into(),
        }
    }

    /// Collection name, falling back to [`DEFAULT_COLLECTION`] when unset.
    pub fn collection(&self) -> &str {
        if self.collection.is_empty() {
            DEFAULT_COLLECTION
        } else {
            &self.collection
        }
    }

    /// Unset variables keep their defaults.
    pub fn from_env() -> Self {
        let collection = std::env::var("CASBIN_DOCSTORE_COLLECTION")
            .unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());
        let namespace = std::env::var("CASBIN_DOCSTORE_NAMESPACE").unwrap_or_default();
        Self {
            collection,
            namespace,
        }
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env();
        if let Ok(path) = std::env::var("CASBIN_DOCSTORE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read CASBIN_DOCSTORE_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: ConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse casbin docstore config yaml")?;
        if let Some(value) = override_cfg.collection {
            self.collection = value;
        }
        if let Some(value) = override_cfg.namespace {
            self.namespace = value;
        }
        Ok(())
    }
}
