use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

const FALLBACK_IDENTIFIER: &str = "element";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorStrategy {
    Role,
    TestId,
    Css,
    Text,
    Xpath,
}

impl LocatorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorStrategy::Role => "role",
            LocatorStrategy::TestId => "test-id",
            LocatorStrategy::Css => "css",
            LocatorStrategy::Text => "text",
            LocatorStrategy::Xpath => "xpath",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locator before it has been placed in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorCandidate {
    pub strategy: LocatorStrategy,
    pub value: String,
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocatorDescriptor {
    pub strategy: LocatorStrategy,
    pub value: String,
    pub label: String,
    pub identifier: String,
}

/// Insertion-ordered locators, unique by `(strategy, value)` and by identifier.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(from = "Vec<LocatorDescriptor>", into = "Vec<LocatorDescriptor>")]
pub struct LocatorTable {
    entries: Vec<LocatorDescriptor>,
}

impl LocatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_candidates(candidates: impl IntoIterator<Item = LocatorCandidate>) -> Self {
        let mut table = Self::new();
        for candidate in candidates {
            table.insert(candidate);
        }
        table
    }

    /// Add a candidate unless an entry with the same strategy and value exists.
    ///
    /// Returns the identifier assigned to the new entry, or `None` for a duplicate.
    pub fn insert(&mut self, candidate: LocatorCandidate) -> Option<&str> {
        if self.contains(candidate.strategy, &candidate.value) {
            return None;
        }
        let used: HashSet<&str> = self
            .entries
            .iter()
            .map(|entry| entry.identifier.as_str())
            .collect();
        let identifier = unique_identifier(&normalize_identifier(&candidate.label), &used);
        self.entries.push(LocatorDescriptor {
            strategy: candidate.strategy,
            value: candidate.value,
            label: candidate.label,
            identifier,
        });
        self.entries.last().map(|entry| entry.identifier.as_str())
    }

    pub fn contains(&self, strategy: LocatorStrategy, value: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.strategy == strategy && entry.value == value)
    }

    pub fn entries(&self) -> &[LocatorDescriptor] {
        &self.entries
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.identifier.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<LocatorDescriptor>> for LocatorTable {
    fn from(entries: Vec<LocatorDescriptor>) -> Self {
        Self { entries }
    }
}

impl From<LocatorTable> for Vec<LocatorDescriptor> {
    fn from(table: LocatorTable) -> Self {
        table.entries
    }
}

/// Lowercase, collapse each run of non-alphanumeric characters to `_`, trim `_`.
pub fn normalize_identifier(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_separator = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    if out.is_empty() {
        FALLBACK_IDENTIFIER.to_string()
    } else {
        out
    }
}

fn unique_identifier(base: &str, used: &HashSet<&str>) -> String {
    if !used.contains(base) {
        return base.to_string();
    }
    let mut idx = 2;
    loop {
        let candidate = format!("{}_{}", base, idx);
        if !used.contains(candidate.as_str()) {
            return candidate;
        }
        idx += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(strategy: LocatorStrategy, value: &str, label: &str) -> LocatorCandidate {
        LocatorCandidate {
            strategy,
            value: value.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("Submit"), "submit");
        assert_eq!(normalize_identifier("submit-btn"), "submit_btn");
        assert_eq!(normalize_identifier("  Sign in / Register!! "), "sign_in_register");
        assert_eq!(normalize_identifier("#email"), "email");
        assert_eq!(normalize_identifier("--"), "element");
    }

    #[test]
    fn test_collisions_get_numeric_suffixes_in_order() {
        let table = LocatorTable::from_candidates(vec![
            candidate(LocatorStrategy::Role, "button[name=\"Submit\"]", "Submit"),
            candidate(LocatorStrategy::Text, "Submit", "Submit"),
            candidate(LocatorStrategy::Css, "#submit", "#submit"),
        ]);
        assert_eq!(table.identifiers(), vec!["submit", "submit_2", "submit_3"]);
    }

    #[test]
    fn test_suffix_skips_identifiers_already_taken() {
        let table = LocatorTable::from_candidates(vec![
            candidate(LocatorStrategy::TestId, "submit-2", "submit-2"),
            candidate(LocatorStrategy::TestId, "submit", "submit"),
            candidate(LocatorStrategy::Text, "Submit", "Submit"),
        ]);
        assert_eq!(table.identifiers(), vec!["submit_2", "submit", "submit_3"]);
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let mut table = LocatorTable::new();
        assert_eq!(
            table.insert(candidate(LocatorStrategy::TestId, "login", "login")),
            Some("login")
        );
        assert!(table
            .insert(candidate(LocatorStrategy::Css, "#pw", "#pw"))
            .is_some());
        assert!(table
            .insert(candidate(LocatorStrategy::TestId, "login", "other"))
            .is_none());
        assert_eq!(table.identifiers(), vec!["login", "pw"]);
    }
}
