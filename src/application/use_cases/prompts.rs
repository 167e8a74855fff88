use crate::domain::code_bundle::TargetLanguage;
use crate::domain::locator::LocatorTable;
use crate::domain::stage_profile::StageProfile;
use crate::domain::test_case::{TestCase, TestCaseSet};
use crate::domain::ticket::TicketDescriptor;

/// Replace `{name}` placeholders; unknown placeholders are left as written.
pub(crate) fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.trim().to_string();
    for (name, value) in values {
        rendered = rendered.replace(&format!("{{{}}}", name), value);
    }
    rendered
}

fn with_expected_output(profile: &StageProfile, task: String) -> String {
    format!(
        "{}\n\nExpected output:\n{}",
        task,
        profile.expected_output.trim()
    )
}

pub(crate) fn build_validation_user_prompt(
    profile: &StageProfile,
    ticket: &TicketDescriptor,
) -> String {
    let task = render_template(
        &profile.task,
        &[("ticket_id", ticket.id.as_str()), ("ticket_text", ticket.text.trim())],
    );
    with_expected_output(profile, task)
}

pub(crate) fn build_test_case_user_prompt(
    profile: &StageProfile,
    ticket: &TicketDescriptor,
) -> String {
    let task = render_template(
        &profile.task,
        &[("ticket_id", ticket.id.as_str()), ("ticket_text", ticket.text.trim())],
    );
    with_expected_output(profile, task)
}

pub(crate) fn build_regeneration_user_prompt(
    profile: &StageProfile,
    ticket: &TicketDescriptor,
    current: &TestCaseSet,
    feedback: &str,
) -> String {
    let mut body = build_test_case_user_prompt(profile, ticket);
    body.push_str("\n\nCurrent test cases:\n");
    for case in current.cases() {
        body.push_str(&format_test_case(case));
        body.push('\n');
    }
    body.push_str("\nReviewer feedback:\n");
    body.push_str(feedback.trim());
    body.push_str(
        "\n\nRewrite the full set so it addresses the feedback. Keep cases that need no change, renumber from TC-01.",
    );
    body
}

pub(crate) fn build_code_user_prompt(
    profile: &StageProfile,
    ticket_id: &str,
    case: &TestCase,
    locators: Option<&LocatorTable>,
    language: TargetLanguage,
) -> String {
    let locator_text = match locators {
        Some(table) if !table.is_empty() => format_locator_table(table),
        _ => "(none recorded; propose stable locators for the elements the steps touch)".to_string(),
    };
    let task = render_template(
        &profile.task,
        &[
            ("test_case_id", case.id.as_str()),
            ("ticket_id", ticket_id),
            ("language", language.as_str()),
            ("framework", language.framework()),
            ("test_case", format_test_case(case).trim_end()),
            ("locators", locator_text.trim_end()),
        ],
    );
    with_expected_output(profile, task)
}

/// Appended to the original request after a response failed structural checks.
pub(crate) fn clarification_addendum(problem: &str) -> String {
    format!(
        "\n\nYour previous response was rejected: {}.\nReturn only the JSON document described above, with every required field present.",
        problem
    )
}

pub(crate) fn format_test_case(case: &TestCase) -> String {
    let mut body = format!("{} [{}] {}\n", case.id, case.category, case.title);
    if !case.preconditions.is_empty() {
        body.push_str("Preconditions:\n");
        for precondition in &case.preconditions {
            body.push_str(&format!("- {}\n", precondition));
        }
    }
    for (index, step) in case.steps.iter().enumerate() {
        body.push_str(&format!(
            "{}. {} => {}\n",
            index + 1,
            step.action,
            step.expected_result
        ));
    }
    body
}

fn format_locator_table(table: &LocatorTable) -> String {
    let mut body = String::new();
    for entry in table.entries() {
        body.push_str(&format!(
            "- {}: {} = {}\n",
            entry.identifier, entry.strategy, entry.value
        ));
    }
    body
}
