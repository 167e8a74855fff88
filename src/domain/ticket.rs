use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::{AppError, Result};

static TICKET_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]*(?:/[A-Z0-9]+)?-\d+$").unwrap());

static TICKET_ID_IN_TEXT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][A-Z0-9]*(?:/[A-Z0-9]+)?-\d+\b").unwrap());

/// Issue-tracker key such as `PROJ-2` or `AI/ML-16084`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::InputError("Ticket id is required.".to_string()));
        }
        if !TICKET_ID_PATTERN.is_match(trimmed) {
            return Err(AppError::InputError(format!(
                "Malformed ticket id '{}': expected a key like PROJ-123.",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// First ticket key mentioned in free text, e.g. a pasted feature description.
    pub fn find_in(text: &str) -> Option<Self> {
        TICKET_ID_IN_TEXT_PATTERN
            .find(text)
            .map(|m| Self(m.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TicketId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TicketId> for String {
    fn from(value: TicketId) -> Self {
        value.0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketDescriptor {
    pub id: TicketId,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TicketDescriptor {
    pub fn new(id: TicketId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn summary(&self) -> Option<&str> {
        self.metadata.get("summary").map(String::as_str)
    }

    /// Copy of this ticket with the user's answers to clarifying questions appended.
    pub fn with_additional_info(&self, info: &str) -> Self {
        let info = info.trim();
        if info.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        next.text = format!("{}\n\nAdditional information:\n{}", self.text.trim_end(), info);
        next
    }
}
