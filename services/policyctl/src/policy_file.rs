//! Casbin CSV policy files (`p, alice, data1, read`).
use anyhow::{Result, bail};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyLine {
    pub ptype: String,
    pub rule: Vec<String>,
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<PolicyLine>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fields = line.split(',').map(str::trim);
    let ptype = fields.next().unwrap_or_default();
    if ptype.is_empty() {
        bail!("missing policy type");
    }
    let rule: Vec<String> = fields.map(str::to_string).collect();
    if rule.is_empty() {
        bail!("policy type `{ptype}` has no fields");
    }
    Ok(Some(PolicyLine {
        ptype: ptype.to_string(),
        rule,
    }))
}

/// Parse a whole file, grouping rules by policy type.
pub fn parse_policy(text: &str) -> Result<BTreeMap<String, Vec<Vec<String>>>> {
    let mut grouped: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let parsed = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(err) => bail!("line {}: {err}", index + 1),
        };
        if let Some(PolicyLine { ptype, rule }) = parsed {
            grouped.entry(ptype).or_default().push(rule);
        }
    }
    Ok(grouped)
}
