use crate::application::use_cases::generation::StageGenerator;
use crate::application::use_cases::llm_output::parse_json_response;
use crate::application::use_cases::prompts::build_code_user_prompt;
use crate::domain::code_bundle::{CodeArtifact, CodeBundle, FunctionSpec, TargetLanguage};
use crate::domain::error::{AppError, Result};
use crate::domain::locator::{LocatorCandidate, LocatorStrategy, LocatorTable};
use crate::domain::stage_profile::StageProfile;
use crate::domain::test_case::TestCase;
use serde_json::Value;

/// Inputs for generating automation code for one test case.
pub struct CodeJob<'a> {
    pub ticket_id: &'a str,
    pub test_case: &'a TestCase,
    pub recording_id: Option<&'a str>,
    pub locators: Option<&'a LocatorTable>,
    pub languages: &'a [TargetLanguage],
}

pub struct CodeSynthesisStage {
    generator: StageGenerator,
    profile: StageProfile,
}

impl CodeSynthesisStage {
    pub fn new(generator: StageGenerator, profile: StageProfile) -> Self {
        Self { generator, profile }
    }

    /// One bundle per requested language; any failing language fails the whole artifact.
    pub async fn synthesize(&self, job: CodeJob<'_>) -> Result<CodeArtifact> {
        if job.languages.is_empty() {
            return Err(AppError::InputError(
                "At least one target language is required.".to_string(),
            ));
        }
        if job.test_case.steps.is_empty() {
            return Err(AppError::InputError(format!(
                "Test case {} has no steps to automate.",
                job.test_case.id
            )));
        }

        let system = self.profile.system_prompt();
        let mut bundles = Vec::with_capacity(job.languages.len());
        for language in job.languages {
            let user = build_code_user_prompt(
                &self.profile,
                job.ticket_id,
                job.test_case,
                job.locators,
                *language,
            );
            let bundle = self
                .generator
                .generate_validated("code-synthesis", &system, &user, |raw| {
                    parse_code_bundle(raw, *language, job.locators)
                })
                .await?;
            tracing::debug!(
                ticket_id = job.ticket_id,
                test_case_id = %job.test_case.id,
                language = %language,
                "Code bundle accepted"
            );
            bundles.push(bundle);
        }

        let locator_table = match job.locators {
            Some(table) => table.clone(),
            None => bundles
                .first()
                .map(|bundle| bundle.locator_table.clone())
                .unwrap_or_default(),
        };

        Ok(CodeArtifact {
            ticket_id: job.ticket_id.to_string(),
            test_case_id: job.test_case.id.clone(),
            test_case_digest: job.test_case.digest(),
            recording_id: job.recording_id.map(str::to_string),
            locator_table,
            bundles,
            generated_at: chrono::Utc::now(),
        })
    }
}

fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> &'a Value {
    match &value[camel] {
        Value::Null => &value[snake],
        found => found,
    }
}

fn parse_function(value: &Value, context: &str) -> Result<FunctionSpec> {
    let function: FunctionSpec = serde_json::from_value(value.clone())
        .map_err(|e| AppError::SchemaViolation(format!("{} is malformed: {}", context, e)))?;
    if function.name.trim().is_empty() {
        return Err(AppError::SchemaViolation(format!("{} has no name", context)));
    }
    if function.body.trim().is_empty() {
        return Err(AppError::SchemaViolation(format!(
            "{} '{}' has an empty body",
            context, function.name
        )));
    }
    Ok(function)
}

fn parse_strategy(value: &str) -> Option<LocatorStrategy> {
    match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "role" => Some(LocatorStrategy::Role),
        "test-id" | "testid" => Some(LocatorStrategy::TestId),
        "css" => Some(LocatorStrategy::Css),
        "text" => Some(LocatorStrategy::Text),
        "xpath" => Some(LocatorStrategy::Xpath),
        _ => None,
    }
}

fn proposed_locators(items: &[Value]) -> Result<LocatorTable> {
    let candidates = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let strategy = item["strategy"]
                .as_str()
                .and_then(parse_strategy)
                .ok_or_else(|| {
                    AppError::SchemaViolation(format!(
                        "locator {} has an unknown strategy",
                        index + 1
                    ))
                })?;
            let value = item["value"]
                .as_str()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    AppError::SchemaViolation(format!("locator {} has no value", index + 1))
                })?;
            let label = item["label"]
                .as_str()
                .or_else(|| item["name"].as_str())
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .unwrap_or(value);
            Ok(LocatorCandidate {
                strategy,
                value: value.to_string(),
                label: label.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LocatorTable::from_candidates(candidates))
}

/// Validate one language's response and build its bundle.
///
/// With a `supplied` table the bundle carries that table unchanged; otherwise the
/// proposed locators go through the same dedup and identifier rules as extraction.
pub fn parse_code_bundle(
    raw: &str,
    language: TargetLanguage,
    supplied: Option<&LocatorTable>,
) -> Result<CodeBundle> {
    let value = parse_json_response(raw)?;
    if !value.is_object() {
        return Err(AppError::SchemaViolation(
            "code response is not a JSON object".to_string(),
        ));
    }

    let locators = value["locators"]
        .as_array()
        .ok_or_else(|| AppError::SchemaViolation("missing locators".to_string()))?;
    let reusable = field(&value, "reusableFunctions", "reusable_functions")
        .as_array()
        .ok_or_else(|| AppError::SchemaViolation("missing reusableFunctions".to_string()))?;
    let test_function = field(&value, "testFunction", "test_function");
    if !test_function.is_object() {
        return Err(AppError::SchemaViolation("missing testFunction".to_string()));
    }
    let integration_prompt = field(&value, "integrationPrompt", "integration_prompt")
        .as_str()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| AppError::SchemaViolation("missing integrationPrompt".to_string()))?;

    let reusable_functions = reusable
        .iter()
        .map(|function| parse_function(function, "reusable function"))
        .collect::<Result<Vec<_>>>()?;
    let test_function = parse_function(test_function, "test function")?;
    let locator_table = match supplied {
        Some(table) => table.clone(),
        None => proposed_locators(locators)?,
    };

    Ok(CodeBundle {
        language,
        locator_table,
        reusable_functions,
        test_function,
        integration_prompt: integration_prompt.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::locator_extraction::extract_locators;
    use serde_json::json;

    fn response() -> Value {
        json!({
            "locators": [
                {"strategy": "test_id", "value": "submit-btn", "label": "Submit"},
                {"strategy": "css", "value": "#email"}
            ],
            "reusable_functions": [
                {"name": "click_element", "parameters": ["locator"], "body": "page.locator(locator).click()"}
            ],
            "test_function": {"name": "test_tc_03", "body": "click_element(LOCATORS['submit'])"},
            "integration_prompt": "Place the helpers in pages/login.py."
        })
    }

    #[test]
    fn test_bundle_uses_supplied_table() {
        let table = extract_locators(r#"page.get_by_role("button", name="Login").click()"#);
        let bundle =
            parse_code_bundle(&response().to_string(), TargetLanguage::Python, Some(&table))
                .unwrap();
        assert_eq!(bundle.locator_table, table);
        assert_eq!(bundle.reusable_functions[0].parameters, vec!["locator"]);
        assert_eq!(bundle.test_function.name, "test_tc_03");
    }

    #[test]
    fn test_bundle_normalizes_proposed_locators() {
        let bundle =
            parse_code_bundle(&response().to_string(), TargetLanguage::TypeScript, None).unwrap();
        assert_eq!(bundle.locator_table.identifiers(), vec!["submit", "email"]);
        assert_eq!(bundle.language, TargetLanguage::TypeScript);
    }

    #[test]
    fn test_missing_fields_are_schema_violations() {
        for missing in ["locators", "reusable_functions", "test_function", "integration_prompt"] {
            let mut value = response();
            value.as_object_mut().unwrap().remove(missing);
            let err = parse_code_bundle(&value.to_string(), TargetLanguage::Python, None)
                .unwrap_err();
            assert!(matches!(err, AppError::SchemaViolation(_)), "{}", missing);
        }
    }

    #[test]
    fn test_function_without_body_is_rejected() {
        let mut value = response();
        value["test_function"]["body"] = json!("  ");
        assert!(matches!(
            parse_code_bundle(&value.to_string(), TargetLanguage::Java, None),
            Err(AppError::SchemaViolation(_))
        ));
    }
}
