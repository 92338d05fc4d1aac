//! Mapping between Casbin rule tuples and flat rule rows.
//!
//! A row stores the policy type plus six positional fields. Absent fields are
//! stored as empty strings, and the first empty field ends the tuple on load,
//! which lets 2-field `g` rules and 6-field `p` rules share one schema.
use serde::{Deserialize, Serialize};

/// Number of positional fields a row can hold.
pub const MAX_FIELDS: usize = 6;

pub const PTYPE_FIELD: &str = "p_type";
pub const FIELD_NAMES: [&str; MAX_FIELDS] = ["v0", "v1", "v2", "v3", "v4", "v5"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRow {
    #[serde(default)]
    pub p_type: String,
    #[serde(default)]
    pub v0: String,
    #[serde(default)]
    pub v1: String,
    #[serde(default)]
    pub v2: String,
    #[serde(default)]
    pub v3: String,
    #[serde(default)]
    pub v4: String,
    #[serde(default)]
    pub v5: String,
}

impl RuleRow {
    /// Build a row from a rule tuple. Values past the sixth are not stored.
    pub fn new(ptype: &str, rule: &[String]) -> Self {
        let mut row = Self {
            p_type: ptype.to_string(),
            ..Self::default()
        };
        for (slot, value) in row.fields_mut().into_iter().zip(rule) {
            *slot = value.clone();
        }
        row
    }

    pub fn fields(&self) -> [&str; MAX_FIELDS] {
        [
            self.v0.as_str(),
            self.v1.as_str(),
            self.v2.as_str(),
            self.v3.as_str(),
            self.v4.as_str(),
            self.v5.as_str(),
        ]
    }

    fn fields_mut(&mut self) -> [&mut String; MAX_FIELDS] {
        [
            &mut self.v0,
            &mut self.v1,
            &mut self.v2,
            &mut self.v3,
            &mut self.v4,
            &mut self.v5,
        ]
    }

    /// Rebuild the rule tuple, stopping at the first empty field.
    pub fn to_rule(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .take_while(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Section the policy type belongs to: its first character.
    pub fn section(&self) -> Option<&str> {
        let first = self.p_type.chars().next()?;
        Some(&self.p_type[..first.len_utf8()])
    }

    /// Render as a Casbin CSV policy line, e.g. `p, alice, data1, read`.
    pub fn to_csv_line(&self) -> String {
        std::iter::once(self.p_type.clone())
            .chain(self.to_rule())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
