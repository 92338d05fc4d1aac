//! Equality-filtered queries and transactional mutation batches.
use crate::{Key, Properties};
use serde_json::Value;

/// Selects every document of one kind in one namespace whose properties equal
/// all of the given filter values.
///
/// A missing or `null` property compares as the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: String,
    pub namespace: String,
    pub filters: Vec<(String, String)>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: String::new(),
            filters: Vec::new(),
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Whether a stored document satisfies this query.
    pub fn matches(&self, key: &Key, properties: &Properties) -> bool {
        key.namespace == self.namespace
            && key.kind == self.kind
            && self
                .filters
                .iter()
                .all(|(field, value)| property_text(properties.get(field)) == *value)
    }
}

fn property_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put { key: Key, properties: Properties },
    Delete(Key),
}

/// A batch of mutations applied atomically by [`crate::DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Key, properties: Properties) -> &mut Self {
        self.mutations.push(Mutation::Put { key, properties });
        self
    }

    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.mutations.push(Mutation::Delete(key));
        self
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}
