use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::cache_key::sha256_hex;
use super::error::{AppError, Result};

pub const MIN_TEST_CASES: usize = 6;
pub const MAX_TEST_CASES: usize = 15;

static TEST_CASE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^TC-\d\d$").unwrap());

pub fn test_case_id_for(position: usize) -> String {
    format!("TC-{:02}", position)
}

/// Validate a caller-supplied test case id such as `TC-03`.
pub fn parse_test_case_id(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if TEST_CASE_ID_PATTERN.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(AppError::InputError(format!(
            "Malformed test case id '{}': expected TC-NN.",
            trimmed
        )))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TestCategory {
    HappyPath,
    Negative,
    Boundary,
    ErrorHandling,
}

impl TestCategory {
    pub const ALL: [TestCategory; 4] = [
        TestCategory::HappyPath,
        TestCategory::Negative,
        TestCategory::Boundary,
        TestCategory::ErrorHandling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::HappyPath => "happy-path",
            TestCategory::Negative => "negative",
            TestCategory::Boundary => "boundary",
            TestCategory::ErrorHandling => "error-handling",
        }
    }

    /// Lenient parse for generated output, which drifts between spellings.
    pub fn from_label(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|ch| if ch == '_' || ch == ' ' { '-' } else { ch })
            .collect();
        match normalized.as_str() {
            "happy-path" | "happy" | "positive" => Some(TestCategory::HappyPath),
            "negative" => Some(TestCategory::Negative),
            "boundary" | "edge" | "edge-case" => Some(TestCategory::Boundary),
            "error-handling" | "error" | "errors" => Some(TestCategory::ErrorHandling),
            _ => None,
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub action: String,
    pub expected_result: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    pub steps: Vec<TestStep>,
    pub category: TestCategory,
}

impl TestCase {
    /// Content address of the case; code generated for it records this value.
    pub fn digest(&self) -> String {
        sha256_hex(&serde_json::to_string(self).unwrap_or_default())
    }
}

/// Ordered test cases with ids `TC-01..TC-NN` and 6..=15 entries.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(try_from = "Vec<TestCase>", into = "Vec<TestCase>")]
pub struct TestCaseSet {
    cases: Vec<TestCase>,
}

impl TestCaseSet {
    pub fn new(cases: Vec<TestCase>) -> Result<Self> {
        let problems = Self::check(&cases);
        if !problems.is_empty() {
            return Err(AppError::SchemaViolation(problems.join("; ")));
        }
        Ok(Self { cases })
    }

    /// Every structural problem with a candidate set, in a stable order.
    pub fn check(cases: &[TestCase]) -> Vec<String> {
        let mut problems = Vec::new();
        if cases.len() < MIN_TEST_CASES || cases.len() > MAX_TEST_CASES {
            problems.push(format!(
                "expected between {} and {} test cases, got {}",
                MIN_TEST_CASES,
                MAX_TEST_CASES,
                cases.len()
            ));
        }
        for (index, case) in cases.iter().enumerate() {
            let expected_id = test_case_id_for(index + 1);
            if case.id != expected_id {
                problems.push(format!(
                    "test case at position {} has id '{}', expected '{}'",
                    index + 1,
                    case.id,
                    expected_id
                ));
            }
            if case.title.trim().is_empty() {
                problems.push(format!("test case {} has an empty title", expected_id));
            }
            if case.steps.is_empty() {
                problems.push(format!("test case {} has no steps", expected_id));
            }
            if case.steps.iter().any(|step| step.action.trim().is_empty()) {
                problems.push(format!("test case {} has a step without an action", expected_id));
            }
        }
        problems
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, test_case_id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|case| case.id == test_case_id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.cases.iter().map(|case| case.id.as_str()).collect()
    }
}

impl TryFrom<Vec<TestCase>> for TestCaseSet {
    type Error = AppError;

    fn try_from(value: Vec<TestCase>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TestCaseSet> for Vec<TestCase> {
    fn from(value: TestCaseSet) -> Self {
        value.cases
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn sample_cases(count: usize) -> Vec<TestCase> {
        (1..=count)
            .map(|n| TestCase {
                id: test_case_id_for(n),
                title: format!("Scenario {}", n),
                preconditions: vec!["User is on the login page".to_string()],
                steps: vec![TestStep {
                    action: format!("Perform action {}", n),
                    expected_result: format!("Outcome {}", n),
                }],
                category: TestCategory::ALL[(n - 1) % TestCategory::ALL.len()],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_cases;
    use super::*;

    #[test]
    fn test_accepts_sequential_ids_within_bounds() {
        let set = TestCaseSet::new(sample_cases(8)).unwrap();
        assert_eq!(set.len(), 8);
        assert_eq!(set.ids().first(), Some(&"TC-01"));
        assert_eq!(set.ids().last(), Some(&"TC-08"));
        assert!(set.get("TC-03").is_some());
    }

    #[test]
    fn test_rejects_counts_outside_bounds() {
        assert!(matches!(
            TestCaseSet::new(sample_cases(5)),
            Err(AppError::SchemaViolation(_))
        ));
        assert!(TestCaseSet::new(sample_cases(15)).is_ok());
        assert!(TestCaseSet::new(sample_cases(16)).is_err());
    }

    #[test]
    fn test_rejects_gaps_and_empty_steps() {
        let mut cases = sample_cases(7);
        cases[2].id = "TC-04".to_string();
        cases[5].steps.clear();
        let problems = TestCaseSet::check(&cases);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("expected 'TC-03'"));
        assert!(problems[1].contains("TC-06 has no steps"));
    }

    #[test]
    fn test_deserialize_revalidates() {
        let json = serde_json::to_string(&sample_cases(3)).unwrap();
        assert!(serde_json::from_str::<TestCaseSet>(&json).is_err());
    }

    #[test]
    fn test_category_aliases() {
        assert_eq!(TestCategory::from_label("Happy Path"), Some(TestCategory::HappyPath));
        assert_eq!(TestCategory::from_label("edge"), Some(TestCategory::Boundary));
        assert_eq!(TestCategory::from_label("error_handling"), Some(TestCategory::ErrorHandling));
        assert_eq!(TestCategory::from_label("smoke"), None);
    }

    #[test]
    fn test_digest_follows_content() {
        let cases = sample_cases(2);
        assert_eq!(cases[0].digest(), cases[0].clone().digest());
        assert_ne!(cases[0].digest(), cases[1].digest());

        let mut retitled = cases[0].clone();
        retitled.title = "Lockout timer resets after an hour".to_string();
        assert_ne!(retitled.digest(), cases[0].digest());
    }

    #[test]
    fn test_parse_test_case_id() {
        assert_eq!(parse_test_case_id(" TC-03 ").unwrap(), "TC-03");
        assert!(parse_test_case_id("TC-3").is_err());
    }
}
