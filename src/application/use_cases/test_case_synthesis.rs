use crate::application::use_cases::generation::StageGenerator;
use crate::application::use_cases::llm_output::parse_json_response;
use crate::application::use_cases::prompts::{
    build_regeneration_user_prompt, build_test_case_user_prompt,
};
use crate::domain::error::{AppError, Result};
use crate::domain::stage_profile::StageProfile;
use crate::domain::test_case::{TestCase, TestCaseSet, TestCategory, TestStep};
use crate::domain::ticket::TicketDescriptor;
use serde_json::Value;

pub struct TestCaseSynthesisStage {
    generator: StageGenerator,
    profile: StageProfile,
}

impl TestCaseSynthesisStage {
    pub fn new(generator: StageGenerator, profile: StageProfile) -> Self {
        Self { generator, profile }
    }

    pub async fn synthesize(&self, ticket: &TicketDescriptor) -> Result<TestCaseSet> {
        let user = build_test_case_user_prompt(&self.profile, ticket);
        let set = self.generate(&user).await?;
        tracing::info!(ticket_id = %ticket.id, count = set.len(), "Test cases generated");
        Ok(set)
    }

    /// New set for the ticket, guided by the reviewer's feedback on `current`.
    pub async fn regenerate(
        &self,
        ticket: &TicketDescriptor,
        current: &TestCaseSet,
        feedback: &str,
    ) -> Result<TestCaseSet> {
        if feedback.trim().is_empty() {
            return Err(AppError::InputError(
                "Feedback is required to regenerate test cases.".to_string(),
            ));
        }
        let user = build_regeneration_user_prompt(&self.profile, ticket, current, feedback);
        let set = self.generate(&user).await?;
        tracing::info!(ticket_id = %ticket.id, count = set.len(), "Test cases regenerated");
        Ok(set)
    }

    async fn generate(&self, user: &str) -> Result<TestCaseSet> {
        self.generator
            .generate_validated(
                "test-case-synthesis",
                &self.profile.system_prompt(),
                user,
                parse_test_cases,
            )
            .await
    }
}

fn text_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| value[*name].as_str())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn string_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Value::String(text) if !text.trim().is_empty() => vec![text.trim().to_string()],
        _ => Vec::new(),
    }
}

fn parse_steps(case: &Value, id: &str) -> Result<Vec<TestStep>> {
    let Some(steps) = case["steps"].as_array() else {
        return Err(AppError::SchemaViolation(format!(
            "test case {} has no steps array",
            id
        )));
    };
    let expected_results = string_items(&case["expected_results"]);

    steps
        .iter()
        .enumerate()
        .map(|(index, step)| match step {
            Value::String(action) => Ok(TestStep {
                action: action.trim().to_string(),
                expected_result: expected_results.get(index).cloned().unwrap_or_default(),
            }),
            Value::Object(_) => Ok(TestStep {
                action: text_field(step, &["action", "step", "description"])
                    .unwrap_or_default()
                    .to_string(),
                expected_result: text_field(
                    step,
                    &["expected_result", "expectedResult", "expected"],
                )
                .unwrap_or_default()
                .to_string(),
            }),
            _ => Err(AppError::SchemaViolation(format!(
                "test case {} step {} is neither text nor an object",
                id,
                index + 1
            ))),
        })
        .collect()
}

fn parse_case(case: &Value, position: usize) -> Result<TestCase> {
    let id = text_field(case, &["id", "test_case_id", "testCaseId"])
        .ok_or_else(|| {
            AppError::SchemaViolation(format!("test case at position {} has no id", position))
        })?
        .to_string();
    let title = text_field(case, &["title", "name"])
        .unwrap_or_default()
        .to_string();
    let category_label = text_field(case, &["category", "type"]).unwrap_or_default();
    let category = TestCategory::from_label(category_label).ok_or_else(|| {
        AppError::SchemaViolation(format!(
            "test case {} has unknown category '{}'",
            id, category_label
        ))
    })?;
    let steps = parse_steps(case, &id)?;

    Ok(TestCase {
        preconditions: string_items(&case["preconditions"]),
        id,
        title,
        steps,
        category,
    })
}

/// Parse a generated test-case document into a validated set.
///
/// Accepts `{"test_cases": [...]}`, `{"testCases": [...]}` or a bare array.
pub fn parse_test_cases(raw: &str) -> Result<TestCaseSet> {
    let value = parse_json_response(raw)?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(_) => value["test_cases"]
            .as_array()
            .or_else(|| value["testCases"].as_array())
            .ok_or_else(|| {
                AppError::SchemaViolation("response has no test_cases array".to_string())
            })?,
        _ => {
            return Err(AppError::SchemaViolation(
                "response is not a test case list".to_string(),
            ))
        }
    };

    let cases = items
        .iter()
        .enumerate()
        .map(|(index, case)| parse_case(case, index + 1))
        .collect::<Result<Vec<_>>>()?;
    TestCaseSet::new(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_case::fixtures::sample_cases;
    use serde_json::json;

    #[test]
    fn test_parse_wrapped_object_steps() {
        let raw = json!({"test_cases": sample_cases(8)}).to_string();
        let set = parse_test_cases(&raw).unwrap();
        assert_eq!(set.len(), 8);
        assert_eq!(set.cases()[0].steps[0].expected_result, "Outcome 1");
    }

    #[test]
    fn test_parse_string_steps_with_parallel_results() {
        let cases: Vec<Value> = (1..=6)
            .map(|n| {
                json!({
                    "id": format!("TC-{:02}", n),
                    "title": format!("Case {}", n),
                    "category": "positive",
                    "preconditions": "Logged out",
                    "steps": ["Open login page", "Submit form"],
                    "expected_results": ["Form visible", "Dashboard shown"]
                })
            })
            .collect();
        let set = parse_test_cases(&Value::Array(cases).to_string()).unwrap();
        let first = &set.cases()[0];
        assert_eq!(first.category, TestCategory::HappyPath);
        assert_eq!(first.preconditions, vec!["Logged out".to_string()]);
        assert_eq!(first.steps[1].action, "Submit form");
        assert_eq!(first.steps[1].expected_result, "Dashboard shown");
    }

    #[test]
    fn test_parse_never_pads_short_sets() {
        let raw = json!({"test_cases": sample_cases(4)}).to_string();
        assert!(matches!(
            parse_test_cases(&raw),
            Err(AppError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        let mut cases = serde_json::to_value(sample_cases(6)).unwrap();
        cases[0]["category"] = json!("smoke");
        assert!(matches!(
            parse_test_cases(&cases.to_string()),
            Err(AppError::SchemaViolation(_))
        ));
    }
}
