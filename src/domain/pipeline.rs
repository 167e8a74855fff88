use serde::{Deserialize, Serialize};

use super::code_bundle::{CodeArtifact, TargetLanguage};
use super::stage::StageName;
use super::test_case::TestCaseSet;
use super::verdict::ValidationVerdict;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    AwaitingValidation,
    Invalid,
    NeedsMoreInfo,
    Ready,
    TestCasesGenerated,
    CodeGenerated,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Invalid | PipelineState::NeedsMoreInfo | PipelineState::CodeGenerated
        )
    }
}

/// Code synthesis for one chosen test case.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CodeRequest {
    pub test_case_id: String,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub recording_id: Option<String>,
    #[serde(default)]
    pub languages: Vec<TargetLanguage>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    pub ticket_id: String,
    #[serde(default)]
    pub additional_info: Option<String>,
    #[serde(default)]
    pub code: Option<CodeRequest>,
}

impl PipelineRequest {
    pub fn for_ticket(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            additional_info: None,
            code: None,
        }
    }

    pub fn with_code(mut self, code: CodeRequest) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: StageName,
    pub key: String,
    pub cache_hit: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub run_id: String,
    pub ticket_id: String,
    pub state: PipelineState,
    pub verdict: Option<ValidationVerdict>,
    pub test_cases: Option<TestCaseSet>,
    pub code: Option<CodeArtifact>,
    pub stages: Vec<StageReport>,
    #[serde(default)]
    pub cancelled: bool,
}

impl PipelineResult {
    pub fn new(run_id: String, ticket_id: String) -> Self {
        Self {
            run_id,
            ticket_id,
            state: PipelineState::AwaitingValidation,
            verdict: None,
            test_cases: None,
            code: None,
            stages: Vec::new(),
            cancelled: false,
        }
    }

    pub fn cache_hit(&self, stage: StageName) -> Option<bool> {
        self.stages
            .iter()
            .rev()
            .find(|report| report.stage == stage)
            .map(|report| report.cache_hit)
    }
}
