//! Document keys.
//!
//! A key addresses one document by namespace, kind and identifier. The
//! identifier is either a caller-chosen name, a store-allocated numeric id,
//! or `Incomplete` until the store allocates one on write.
use crate::{StoreError, StoreResult};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyId {
    Incomplete,
    Id(i64),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub namespace: String,
    pub kind: String,
    pub id: KeyId,
}

impl Key {
    /// Key with a caller-chosen name in the root namespace.
    pub fn name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            kind: kind.into(),
            id: KeyId::Name(name.into()),
        }
    }

    pub fn id(kind: impl Into<String>, id: i64) -> Self {
        Self {
            namespace: String::new(),
            kind: kind.into(),
            id: KeyId::Id(id),
        }
    }

    /// Key whose id is allocated by the store on write.
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            kind: kind.into(),
            id: KeyId::Incomplete,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self.id, KeyId::Incomplete)
    }

    /// Reject keys no backend can store. Relational backends encode "no name" as
    /// `''`, so an empty name would read back as an allocated id.
    pub(crate) fn validate(&self) -> StoreResult<()> {
        if matches!(&self.id, KeyId::Name(name) if name.is_empty()) {
            return Err(StoreError::InvalidKey(format!("{self} has an empty name")));
        }
        Ok(())
    }

    /// Valid and addressing one existing slot (not incomplete).
    pub(crate) fn require_complete(&self) -> StoreResult<()> {
        self.validate()?;
        if self.is_complete() {
            Ok(())
        } else {
            Err(StoreError::InvalidKey(format!("{self} is incomplete")))
        }
    }

    /// Resolve an incomplete key to an allocated id; complete keys are unchanged.
    pub(crate) fn resolve(self, allocate: impl FnOnce() -> i64) -> Self {
        match self.id {
            KeyId::Incomplete => Self {
                id: KeyId::Id(allocate()),
                ..self
            },
            _ => self,
        }
    }

    /// Column values used by relational backends: `(name, id)`.
    pub(crate) fn columns(&self) -> (&str, i64) {
        match &self.id {
            KeyId::Name(name) => (name.as_str(), 0),
            KeyId::Id(id) => ("", *id),
            KeyId::Incomplete => ("", 0),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            KeyId::Name(name) => write!(f, "{}/{}/{name}", self.namespace, self.kind),
            KeyId::Id(id) => write!(f, "{}/{}/#{id}", self.namespace, self.kind),
            KeyId::Incomplete => write!(f, "{}/{}/?", self.namespace, self.kind),
        }
    }
}
