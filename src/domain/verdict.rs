use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Invalid { reason: String },
    NeedsMoreInfo { questions: Vec<String> },
    Ready,
}

impl ValidationVerdict {
    pub fn is_ready(&self) -> bool {
        matches!(self, ValidationVerdict::Ready)
    }
}
