use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::AppError;
use super::locator::LocatorTable;
use super::test_case::TestCase;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    Python,
    JavaScript,
    TypeScript,
    Java,
}

impl TargetLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetLanguage::Python => "python",
            TargetLanguage::JavaScript => "javascript",
            TargetLanguage::TypeScript => "typescript",
            TargetLanguage::Java => "java",
        }
    }

    /// Test runner the generated code targets.
    pub fn framework(&self) -> &'static str {
        match self {
            TargetLanguage::Python => "pytest with playwright.sync_api",
            TargetLanguage::JavaScript => "@playwright/test (CommonJS)",
            TargetLanguage::TypeScript => "@playwright/test",
            TargetLanguage::Java => "JUnit 5 with com.microsoft.playwright",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetLanguage {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(TargetLanguage::Python),
            "javascript" | "js" => Ok(TargetLanguage::JavaScript),
            "typescript" | "ts" => Ok(TargetLanguage::TypeScript),
            "java" => Ok(TargetLanguage::Java),
            other => Err(AppError::InputError(format!(
                "Unsupported target language: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CodeBundle {
    pub language: TargetLanguage,
    pub locator_table: LocatorTable,
    pub reusable_functions: Vec<FunctionSpec>,
    pub test_function: FunctionSpec,
    pub integration_prompt: String,
}

/// Everything code synthesis produced for one test case, as cached.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeArtifact {
    pub ticket_id: String,
    pub test_case_id: String,
    /// `TestCase::digest` of the case the code was written for.
    #[serde(default)]
    pub test_case_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
    pub locator_table: LocatorTable,
    pub bundles: Vec<CodeBundle>,
    pub generated_at: DateTime<Utc>,
}

impl CodeArtifact {
    pub fn covers(&self, languages: &[TargetLanguage]) -> bool {
        languages
            .iter()
            .all(|language| self.bundles.iter().any(|bundle| bundle.language == *language))
    }

    /// Whether a cached artifact still answers a request for `test_case`.
    ///
    /// `locators` is the table extracted from the request's transcript, if any.
    pub fn serves(
        &self,
        test_case: &TestCase,
        locators: Option<&LocatorTable>,
        languages: &[TargetLanguage],
    ) -> bool {
        self.test_case_digest == test_case.digest()
            && locators.map_or(true, |table| &self.locator_table == table)
            && self.covers(languages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::domain::locator::{LocatorCandidate, LocatorStrategy};
    use crate::domain::test_case::fixtures::sample_cases;

    fn artifact(test_case: &TestCase, locator_table: LocatorTable) -> CodeArtifact {
        CodeArtifact {
            ticket_id: "PROJ-2".to_string(),
            test_case_id: test_case.id.clone(),
            test_case_digest: test_case.digest(),
            recording_id: None,
            locator_table,
            bundles: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_serves_only_the_same_case_and_locators() {
        let cases = sample_cases(2);
        let mut table = LocatorTable::default();
        table.insert(LocatorCandidate {
            strategy: LocatorStrategy::TestId,
            value: "submit-btn".to_string(),
            label: "submit-btn".to_string(),
        });
        let cached = artifact(&cases[0], table.clone());

        assert!(cached.serves(&cases[0], Some(&table), &[]));
        assert!(cached.serves(&cases[0], None, &[]));
        assert!(!cached.serves(&cases[1], Some(&table), &[]));
        assert!(!cached.serves(&cases[0], Some(&LocatorTable::default()), &[]));
        assert!(!cached.serves(&cases[0], None, &[TargetLanguage::Java]));

        let mut legacy = cached.clone();
        legacy.test_case_digest = String::new();
        assert!(!legacy.serves(&cases[0], None, &[]));
    }

    #[test]
    fn test_language_aliases() {
        assert_eq!("JS".parse::<TargetLanguage>().unwrap(), TargetLanguage::JavaScript);
        assert_eq!(" python ".parse::<TargetLanguage>().unwrap(), TargetLanguage::Python);
        assert!(matches!(
            "cobol".parse::<TargetLanguage>(),
            Err(AppError::InputError(_))
        ));
    }
}
