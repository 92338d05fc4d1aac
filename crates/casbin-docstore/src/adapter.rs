//! Casbin adapter that persists policy rules as documents.
//!
//! # Purpose
//! Implements [`casbin::Adapter`] on top of any [`DocumentStore`]. Every rule is
//! one [`RuleRow`] document with a store-allocated id, stored in the configured
//! collection and namespace.
//!
//! # Key invariants
//! - Only documents with allocated ids are rule rows. Named documents in the
//!   same collection (the model document) are never loaded or deleted here.
//! - Removal by rule compares `p_type` and `v0..v4`; `v5` is never used as a
//!   discriminator.
//! - Empty values in a filtered removal are wildcards, not "match empty".
//! - `save_policy` replaces the whole collection/namespace in one commit.
//!
//! # Statelessness
//! Apart from the `is_filtered` flag, the adapter keeps no policy state between
//! calls; every call is an independent request against the store.
use crate::config::Config;
use crate::errors::DocStoreResult;
use crate::rule::{FIELD_NAMES, MAX_FIELDS, PTYPE_FIELD, RuleRow};
use async_trait::async_trait;
use casbin::{Adapter, Filter, Model, Result as CasbinResult};
use docstore::{DocumentStore, Entity, Key, KeyId, Query, Transaction, encode};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Leading rule fields compared when removing a single rule.
const REMOVE_MATCH_FIELDS: usize = 5;

/// Policy adapter over a shared document store handle.
///
/// The handle is owned by whoever opened it; [`DocStoreAdapter::close`] is a
/// convenience that closes it through the adapter.
pub struct DocStoreAdapter {
    store: Arc<dyn DocumentStore>,
    config: Config,
    is_filtered: bool,
}

impl DocStoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, Config::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        Self {
            store,
            config,
            is_filtered: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn close(&self) -> DocStoreResult<()> {
        self.store.close().await?;
        Ok(())
    }

    /// Every stored rule row in the configured collection/namespace.
    pub async fn load_rules(&self) -> DocStoreResult<Vec<RuleRow>> {
        self.scan(self.base_query())
            .await?
            .iter()
            .map(|entity| entity.decode::<RuleRow>().map_err(Into::into))
            .collect()
    }

    fn base_query(&self) -> Query {
        Query::new(self.config.collection()).in_namespace(&self.config.namespace)
    }

    fn new_key(&self) -> Key {
        Key::incomplete(self.config.collection()).with_namespace(&self.config.namespace)
    }

    async fn scan(&self, query: Query) -> DocStoreResult<Vec<Entity>> {
        let entities = self.store.query(&query).await?;
        Ok(entities
            .into_iter()
            .filter(|entity| matches!(entity.key.id, KeyId::Id(_)))
            .collect())
    }

    /// Delete every rule row matching any of `queries` in one commit.
    async fn delete_matching(&self, queries: Vec<Query>) -> DocStoreResult<usize> {
        let mut keys = BTreeSet::new();
        for query in queries {
            keys.extend(self.scan(query).await?.into_iter().map(|entity| entity.key));
        }
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = keys.len();
        let mut tx = Transaction::new();
        for key in keys {
            tx.delete(key);
        }
        self.store.commit(tx).await?;
        Ok(removed)
    }

    fn rule_query(&self, ptype: &str, rule: &[String]) -> Query {
        let row = RuleRow::new(ptype, rule);
        row.fields()
            .into_iter()
            .zip(FIELD_NAMES)
            .take(REMOVE_MATCH_FIELDS)
            .fold(
                self.base_query().filter_eq(PTYPE_FIELD, ptype),
                |query, (value, field)| query.filter_eq(field, value),
            )
    }

    /// Query for a filtered removal, or `None` when a non-empty value targets a
    /// position past `v5`, which no stored row can match.
    fn filtered_query(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Option<Query> {
        let mut query = self.base_query().filter_eq(PTYPE_FIELD, ptype);
        for (offset, value) in field_values.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let index = field_index.checked_add(offset).filter(|index| *index < MAX_FIELDS)?;
            query = query.filter_eq(FIELD_NAMES[index], value.as_str());
        }
        Some(query)
    }

    async fn insert_rules(&self, ptype: &str, rules: &[Vec<String>]) -> DocStoreResult<usize> {
        let mut tx = Transaction::new();
        for rule in rules {
            tx.put(self.new_key(), encode(&RuleRow::new(ptype, rule))?);
        }
        let written = self.store.commit(tx).await?;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            ptype,
            inserted = written.len(),
            "inserted policy rules"
        );
        Ok(written.len())
    }

    async fn replace_rules(&self, rows: Vec<RuleRow>) -> DocStoreResult<()> {
        let existing = self.scan(self.base_query()).await?;
        let removed = existing.len();
        let inserted = rows.len();
        let mut tx = Transaction::new();
        for entity in existing {
            tx.delete(entity.key);
        }
        for row in &rows {
            tx.put(self.new_key(), encode(row)?);
        }
        self.store.commit(tx).await?;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            removed,
            inserted,
            "replaced policy rules"
        );
        Ok(())
    }
}

/// Rows for every rule held in the `p` and `g` sections of a model.
fn model_rows(m: &dyn Model) -> Vec<RuleRow> {
    let mut rows = Vec::new();
    for sec in ["p", "g"] {
        let Some(ast_map) = m.get_model().get(sec) else {
            continue;
        };
        for (ptype, ast) in ast_map {
            for rule in ast.get_policy() {
                rows.push(RuleRow::new(ptype, rule));
            }
        }
    }
    rows
}

/// Append a stored row to the model. Returns false when the row was skipped.
fn load_row(m: &mut dyn Model, row: &RuleRow) -> bool {
    let Some(sec) = row.section() else {
        tracing::warn!("skipping rule row without p_type");
        return false;
    };
    let known = m
        .get_model()
        .get(sec)
        .is_some_and(|ast_map| ast_map.contains_key(row.p_type.as_str()));
    if !known {
        tracing::warn!(ptype = %row.p_type, "skipping rule row for policy type missing from model");
        return false;
    }
    m.add_policy(sec, &row.p_type, row.to_rule());
    true
}

/// Positional match against the filter values for the row's section; empty
/// filter values match anything.
fn filter_matches(row: &RuleRow, filter: &Filter<'_>) -> bool {
    let values = match row.section() {
        Some("p") => &filter.p,
        Some("g") => &filter.g,
        _ => return false,
    };
    let fields = row.fields();
    values.iter().enumerate().all(|(index, value)| {
        value.is_empty() || fields.get(index).is_some_and(|field| field == value)
    })
}

#[async_trait]
impl Adapter for DocStoreAdapter {
    async fn load_policy(&mut self, m: &mut dyn Model) -> CasbinResult<()> {
        let rows = self.load_rules().await?;
        let mut loaded = 0;
        for row in &rows {
            if load_row(&mut *m, row) {
                loaded += 1;
            }
        }
        self.is_filtered = false;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            loaded,
            skipped = rows.len() - loaded,
            "loaded policy"
        );
        Ok(())
    }

    async fn load_filtered_policy<'a>(
        &mut self,
        m: &mut dyn Model,
        f: Filter<'a>,
    ) -> CasbinResult<()> {
        let rows = self.load_rules().await?;
        let mut loaded = 0;
        for row in rows.iter().filter(|row| filter_matches(row, &f)) {
            if load_row(&mut *m, row) {
                loaded += 1;
            }
        }
        self.is_filtered = true;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            loaded,
            "loaded filtered policy"
        );
        Ok(())
    }

    async fn save_policy(&mut self, m: &mut dyn Model) -> CasbinResult<()> {
        let rows = model_rows(&*m);
        self.replace_rules(rows).await?;
        Ok(())
    }

    async fn clear_policy(&mut self) -> CasbinResult<()> {
        let removed = self.delete_matching(vec![self.base_query()]).await?;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            removed,
            "cleared policy"
        );
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.is_filtered
    }

    async fn add_policy(&mut self, _sec: &str, ptype: &str, rule: Vec<String>) -> CasbinResult<bool> {
        self.insert_rules(ptype, &[rule]).await?;
        Ok(true)
    }

    async fn add_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> CasbinResult<bool> {
        self.insert_rules(ptype, &rules).await?;
        Ok(true)
    }

    async fn remove_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> CasbinResult<bool> {
        let removed = self.delete_matching(vec![self.rule_query(ptype, &rule)]).await?;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            ptype,
            removed,
            "removed policy rule"
        );
        Ok(removed > 0)
    }

    async fn remove_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> CasbinResult<bool> {
        let queries = rules
            .iter()
            .map(|rule| self.rule_query(ptype, rule))
            .collect();
        let removed = self.delete_matching(queries).await?;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            ptype,
            requested = rules.len(),
            removed,
            "removed policy rules"
        );
        Ok(removed > 0)
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> CasbinResult<bool> {
        let Some(query) = self.filtered_query(ptype, field_index, &field_values) else {
            return Ok(false);
        };
        let removed = self.delete_matching(vec![query]).await?;
        tracing::debug!(
            collection = self.config.collection(),
            namespace = %self.config.namespace,
            ptype,
            field_index,
            removed,
            "removed filtered policy"
        );
        Ok(removed > 0)
    }
}
