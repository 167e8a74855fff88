//! Locator extraction from recorder transcripts.
//!
//! The recorder emits Playwright code in Python, JavaScript/TypeScript, Java or
//! C#. Extraction is a pure scan over that text: it never calls out, never
//! fails, and yields the same table for the same bytes. Call sites it cannot
//! read are skipped.

use crate::domain::locator::{LocatorCandidate, LocatorStrategy, LocatorTable};
use once_cell::sync::Lazy;
use regex::Regex;

static ACCESSOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(get_by_role|getByRole|GetByRole|get_by_test_id|getByTestId|GetByTestId|get_by_text|getByText|GetByText|locator|Locator)\s*\(",
    )
    .unwrap()
});

/// Accessible-name option in each recorder dialect:
/// `name="x"`, `{ name: 'x' }`, `.setName("x")`, `Name = "x"`.
static NAME_OPTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:\bname\s*[:=]\s*|\.setName\(\s*|\bName\s*=\s*)(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|`((?:[^`\\]|\\.)*)`)"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accessor {
    Role,
    TestId,
    Text,
    Raw,
}

impl Accessor {
    fn from_method(method: &str) -> Self {
        match method {
            "get_by_role" | "getByRole" | "GetByRole" => Accessor::Role,
            "get_by_test_id" | "getByTestId" | "GetByTestId" => Accessor::TestId,
            "get_by_text" | "getByText" | "GetByText" => Accessor::Text,
            _ => Accessor::Raw,
        }
    }
}

/// Ordered, deduplicated locator table for a transcript.
pub fn extract_locators(transcript: &str) -> LocatorTable {
    LocatorTable::from_candidates(scan_candidates(transcript))
}

/// Every readable accessor call in source order, duplicates included.
pub fn scan_candidates(transcript: &str) -> Vec<LocatorCandidate> {
    ACCESSOR_PATTERN
        .captures_iter(transcript)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let accessor = Accessor::from_method(caps.get(1)?.as_str());
            let arguments = call_arguments(transcript, whole.end())?;
            candidate_for(accessor, arguments)
        })
        .collect()
}

fn candidate_for(accessor: Accessor, arguments: &str) -> Option<LocatorCandidate> {
    let (first, rest) = split_first_argument(arguments);
    match accessor {
        Accessor::Role => {
            let role = role_name(first)?;
            let name = NAME_OPTION_PATTERN.captures(rest).and_then(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| unescape(m.as_str()))
            });
            Some(match name {
                Some(name) => LocatorCandidate {
                    strategy: LocatorStrategy::Role,
                    value: format!("{}[name=\"{}\"]", role, name),
                    label: name,
                },
                None => LocatorCandidate {
                    strategy: LocatorStrategy::Role,
                    value: role.clone(),
                    label: role,
                },
            })
        }
        Accessor::TestId => {
            let id = string_literal(first)?;
            Some(LocatorCandidate {
                strategy: LocatorStrategy::TestId,
                value: id.clone(),
                label: id,
            })
        }
        Accessor::Text => {
            let text = string_literal(first)?;
            Some(LocatorCandidate {
                strategy: LocatorStrategy::Text,
                value: text.clone(),
                label: text,
            })
        }
        Accessor::Raw => {
            let selector = string_literal(first)?;
            let (strategy, value) = classify_selector(&selector);
            if value.is_empty() {
                return None;
            }
            Some(LocatorCandidate {
                strategy,
                label: value.clone(),
                value,
            })
        }
    }
}

fn classify_selector(selector: &str) -> (LocatorStrategy, String) {
    let selector = selector.trim();
    if let Some(path) = selector.strip_prefix("xpath=") {
        (LocatorStrategy::Xpath, path.trim().to_string())
    } else if selector.starts_with("//") || selector.starts_with("(//") {
        (LocatorStrategy::Xpath, selector.to_string())
    } else if let Some(text) = selector.strip_prefix("text=") {
        (LocatorStrategy::Text, strip_quotes(text.trim()).to_string())
    } else if let Some(css) = selector.strip_prefix("css=") {
        (LocatorStrategy::Css, css.trim().to_string())
    } else {
        (LocatorStrategy::Css, selector.to_string())
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Role from a string literal (`"button"`) or an enum path (`AriaRole.BUTTON`).
fn role_name(argument: &str) -> Option<String> {
    if let Some(role) = string_literal(argument) {
        let role = role.trim().to_ascii_lowercase();
        return (!role.is_empty()).then_some(role);
    }
    let path = argument.trim();
    if path.is_empty()
        || !path
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == ':')
    {
        return None;
    }
    let last = path.rsplit(['.', ':']).next()?;
    (!last.is_empty()).then(|| last.to_ascii_lowercase())
}

/// Argument text between the `(` that ends at `open_end` and its matching `)`.
fn call_arguments(text: &str, open_end: usize) -> Option<&str> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in text[open_end..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open_end..open_end + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_first_argument(arguments: &str) -> (&str, &str) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in arguments.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return (&arguments[..offset], &arguments[offset + 1..]),
            _ => {}
        }
    }
    (arguments, "")
}

/// Content of a single quoted literal; `r"..."` and `@"..."` prefixes are accepted.
fn string_literal(argument: &str) -> Option<String> {
    let trimmed = argument.trim();
    let trimmed = trimmed
        .strip_prefix('r')
        .or_else(|| trimmed.strip_prefix('@'))
        .filter(|rest| rest.starts_with(['"', '\'']))
        .unwrap_or(trimmed);
    let quote = trimmed.chars().next()?;
    if !matches!(quote, '"' | '\'' | '`') || trimmed.len() < 2 || !trimmed.ends_with(quote) {
        return None;
    }
    Some(unescape(&trimmed[1..trimmed.len() - 1]))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(table: &LocatorTable) -> Vec<(LocatorStrategy, &str, &str)> {
        table
            .entries()
            .iter()
            .map(|entry| (entry.strategy, entry.value.as_str(), entry.identifier.as_str()))
            .collect()
    }

    #[test]
    fn test_role_and_test_id_from_python_recording() {
        let transcript = r#"
from playwright.sync_api import Page

def run(page: Page) -> None:
    page.goto("https://example.test/login")
    page.get_by_role("button", name="Login").click()
    page.get_by_test_id("submit-btn").click()
"#;
        let table = extract_locators(transcript);
        assert_eq!(
            summary(&table),
            vec![
                (LocatorStrategy::Role, r#"button[name="Login"]"#, "login"),
                (LocatorStrategy::TestId, "submit-btn", "submit_btn"),
            ]
        );
    }

    #[test]
    fn test_each_recorder_dialect() {
        let transcript = r#"
await page.getByRole('textbox', { name: 'Email address' }).fill('a@b.c');
page.getByRole(AriaRole.BUTTON, new Page.GetByRoleOptions().setName("Sign in")).click();
await page.GetByRole(AriaRole.Link, new() { Name = "Forgot password?" }).ClickAsync();
await page.getByText('Welcome back').click();
page.locator("xpath=//div[@id='menu']").click()
page.locator("(//li)[2]").click()
page.locator("css=#cart .total").click()
page.locator("text=Checkout").click()
page.locator(".banner").click()
"#;
        let table = extract_locators(transcript);
        assert_eq!(
            summary(&table),
            vec![
                (
                    LocatorStrategy::Role,
                    r#"textbox[name="Email address"]"#,
                    "email_address"
                ),
                (LocatorStrategy::Role, r#"button[name="Sign in"]"#, "sign_in"),
                (
                    LocatorStrategy::Role,
                    r#"link[name="Forgot password?"]"#,
                    "forgot_password"
                ),
                (LocatorStrategy::Text, "Welcome back", "welcome_back"),
                (LocatorStrategy::Xpath, "//div[@id='menu']", "div_id_menu"),
                (LocatorStrategy::Xpath, "(//li)[2]", "li_2"),
                (LocatorStrategy::Css, "#cart .total", "cart_total"),
                (LocatorStrategy::Text, "Checkout", "checkout"),
                (LocatorStrategy::Css, ".banner", "banner"),
            ]
        );
    }

    #[test]
    fn test_duplicates_keep_first_and_labels_collide() {
        let transcript = r#"
page.get_by_role("button", name="Submit").click()
page.get_by_role("button", name="Submit").click()
page.get_by_role("link", name="Submit").click()
page.get_by_role("menuitem", name="Submit").click()
"#;
        let table = extract_locators(transcript);
        assert_eq!(table.identifiers(), vec!["submit", "submit_2", "submit_3"]);
    }

    #[test]
    fn test_role_without_name_uses_role() {
        let table = extract_locators(r#"page.get_by_role("checkbox").check()"#);
        assert_eq!(
            summary(&table),
            vec![(LocatorStrategy::Role, "checkbox", "checkbox")]
        );
    }

    #[test]
    fn test_unreadable_calls_are_skipped() {
        let transcript = r##"
page.locator(selector_var).click()
page.get_by_test_id("unterminated
page.get_by_text(re.compile("Hello")).click()
page.click("#legacy")
"##;
        assert!(extract_locators(transcript).is_empty());
    }

    #[test]
    fn test_non_alphanumeric_label_falls_back() {
        let table = extract_locators(r#"page.get_by_text("→ ←").click()"#);
        assert_eq!(table.identifiers(), vec!["element"]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let transcript = r##"
page.get_by_role("button", name="Login").click()
page.get_by_test_id("submit-btn").click()
page.locator("#email").fill("x")
"##;
        let first = serde_json::to_vec(&extract_locators(transcript)).unwrap();
        let second = serde_json::to_vec(&extract_locators(transcript)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_escaped_quotes_in_names() {
        let table = extract_locators(r#"page.get_by_role("button", name="Say \"hi\"").click()"#);
        assert_eq!(table.entries()[0].label, r#"Say "hi""#);
        assert_eq!(table.identifiers(), vec!["say_hi"]);
    }
}
