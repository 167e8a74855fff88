use crate::domain::error::{AppError, Result};
use crate::domain::ticket::{TicketDescriptor, TicketId};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// Where ticket descriptions come from.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// `NotFound` for an unknown ticket, `ExternalCapability` when the tracker is unavailable.
    async fn fetch(&self, ticket_id: &TicketId) -> Result<TicketDescriptor>;
}

#[derive(Debug, Clone)]
pub struct JiraCredentials {
    pub email: String,
    pub api_token: String,
}

/// Jira Cloud REST v3 issue lookup.
pub struct JiraTicketSource {
    client: reqwest::Client,
    base_url: Url,
    credentials: JiraCredentials,
}

impl JiraTicketSource {
    pub fn new(base_url: &str, credentials: JiraCredentials) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|e| AppError::InputError(format!("Invalid Jira base URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn issue_url(&self, ticket_id: &TicketId) -> Result<Url> {
        let mut url = self
            .base_url
            .join("rest/api/3/issue/")
            .map_err(|e| AppError::Internal(format!("Failed to build Jira URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Jira base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(ticket_id.as_str());
        url.query_pairs_mut()
            .append_pair("fields", "summary,description,project,status");
        Ok(url)
    }
}

#[async_trait]
impl TicketSource for JiraTicketSource {
    async fn fetch(&self, ticket_id: &TicketId) -> Result<TicketDescriptor> {
        let url = self.issue_url(ticket_id)?;
        tracing::debug!(ticket_id = %ticket_id, url = %url, "Fetching Jira issue");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.email, Some(&self.credentials.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Jira request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(AppError::NotFound(format!("Ticket {} not found", ticket_id)));
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                return Err(AppError::ExternalCapability(format!(
                    "Jira API error ({}): {}",
                    status, text
                )));
            }
        }

        let issue: Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Failed to parse Jira JSON: {}", e)))?;
        Ok(descriptor_from_issue(ticket_id.clone(), &issue))
    }
}

fn descriptor_from_issue(ticket_id: TicketId, issue: &Value) -> TicketDescriptor {
    let fields = &issue["fields"];
    let summary = fields["summary"].as_str().unwrap_or_default().trim();
    let description = match &fields["description"] {
        Value::String(text) => text.trim().to_string(),
        Value::Null => String::new(),
        doc => flatten_adf(doc).trim().to_string(),
    };

    let text = match (summary.is_empty(), description.is_empty()) {
        (false, false) => format!("{}\n\n{}", summary, description),
        (false, true) => summary.to_string(),
        _ => description,
    };

    let mut descriptor = TicketDescriptor::new(ticket_id, text);
    if !summary.is_empty() {
        descriptor = descriptor.with_metadata("summary", summary);
    }
    if let Some(project) = fields["project"]["name"].as_str() {
        descriptor = descriptor.with_metadata("project", project);
    }
    if let Some(status) = fields["status"]["name"].as_str() {
        descriptor = descriptor.with_metadata("status", status);
    }
    descriptor
}

/// Plain text of an Atlassian Document Format node.
pub fn flatten_adf(node: &Value) -> String {
    let mut out = String::new();
    write_adf(node, &mut out);
    out
}

fn write_adf(node: &Value, out: &mut String) {
    let children = node["content"].as_array();
    match node["type"].as_str().unwrap_or_default() {
        "text" => out.push_str(node["text"].as_str().unwrap_or_default()),
        "hardBreak" => out.push('\n'),
        "listItem" => {
            out.push_str("- ");
            for child in children.into_iter().flatten() {
                write_adf(child, out);
            }
            ensure_newline(out);
        }
        "paragraph" | "heading" | "codeBlock" | "blockquote" => {
            for child in children.into_iter().flatten() {
                write_adf(child, out);
            }
            ensure_newline(out);
        }
        _ => {
            for child in children.into_iter().flatten() {
                write_adf(child, out);
            }
        }
    }
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Fixed set of tickets, for tests and offline runs.
#[derive(Default)]
pub struct InMemoryTicketSource {
    tickets: RwLock<HashMap<String, TicketDescriptor>>,
}

impl InMemoryTicketSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, ticket: TicketDescriptor) {
        self.tickets
            .write()
            .await
            .insert(ticket.id.as_str().to_string(), ticket);
    }
}

#[async_trait]
impl TicketSource for InMemoryTicketSource {
    async fn fetch(&self, ticket_id: &TicketId) -> Result<TicketDescriptor> {
        self.tickets
            .read()
            .await
            .get(ticket_id.as_str())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))
    }
}
