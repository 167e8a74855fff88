use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    TicketFetch,
    Validation,
    TestCaseSynthesis,
    LocatorExtraction,
    CodeSynthesis,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::TicketFetch => "ticket-fetch",
            StageName::Validation => "validation",
            StageName::TestCaseSynthesis => "test-case-synthesis",
            StageName::LocatorExtraction => "locator-extraction",
            StageName::CodeSynthesis => "code-synthesis",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
