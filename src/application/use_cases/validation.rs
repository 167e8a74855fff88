use crate::application::use_cases::generation::StageGenerator;
use crate::application::use_cases::llm_output::parse_json_response;
use crate::application::use_cases::prompts::build_validation_user_prompt;
use crate::domain::error::{AppError, Result};
use crate::domain::stage_profile::StageProfile;
use crate::domain::ticket::TicketDescriptor;
use crate::domain::verdict::ValidationVerdict;
use serde_json::Value;

/// Gate deciding whether a ticket is detailed enough to test.
pub struct ValidationStage {
    generator: StageGenerator,
    profile: StageProfile,
    min_description_chars: usize,
}

impl ValidationStage {
    pub fn new(
        generator: StageGenerator,
        profile: StageProfile,
        min_description_chars: usize,
    ) -> Self {
        Self {
            generator,
            profile,
            min_description_chars,
        }
    }

    /// Fails with `InputError` before any external call when the text is too short.
    pub fn check_detail(&self, ticket: &TicketDescriptor) -> Result<()> {
        let length = ticket.text.trim().chars().count();
        if length < self.min_description_chars {
            return Err(AppError::InputError(format!(
                "insufficient detail: the description of {} has {} characters, at least {} are required",
                ticket.id, length, self.min_description_chars
            )));
        }
        Ok(())
    }

    pub async fn validate(&self, ticket: &TicketDescriptor) -> Result<ValidationVerdict> {
        self.check_detail(ticket)?;
        let user = build_validation_user_prompt(&self.profile, ticket);
        let raw = self
            .generator
            .generate("validation", &self.profile.system_prompt(), &user)
            .await?;
        let verdict = parse_verdict(&raw)?;
        tracing::info!(ticket_id = %ticket.id, verdict = ?verdict, "Ticket validated");
        Ok(verdict)
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(text) if !text.trim().is_empty() => vec![text.trim().to_string()],
        _ => Vec::new(),
    }
}

pub fn parse_verdict(raw: &str) -> Result<ValidationVerdict> {
    let value = parse_json_response(raw)?;
    let status = value["status"]
        .as_str()
        .map(|status| status.trim().to_ascii_lowercase().replace(['-', ' '], "_"))
        .ok_or_else(|| AppError::SchemaViolation("verdict has no status".to_string()))?;
    let notes = value["notes"]
        .as_str()
        .or_else(|| value["reason"].as_str())
        .map(str::trim)
        .unwrap_or_default();

    match status.as_str() {
        "ready" => Ok(ValidationVerdict::Ready),
        "invalid" => Ok(ValidationVerdict::Invalid {
            reason: if notes.is_empty() {
                "The ticket does not describe testable behaviour.".to_string()
            } else {
                notes.to_string()
            },
        }),
        "needs_more_info" => {
            let questions = string_list(&value["questions"]);
            if questions.is_empty() {
                return Err(AppError::SchemaViolation(
                    "needs_more_info verdict without questions".to_string(),
                ));
            }
            Ok(ValidationVerdict::NeedsMoreInfo { questions })
        }
        other => Err(AppError::SchemaViolation(format!(
            "unknown verdict status '{}'",
            other
        ))),
    }
}
