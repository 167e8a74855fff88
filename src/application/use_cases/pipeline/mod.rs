mod locks;

pub use locks::KeyLocks;

use crate::application::use_cases::code_synthesis::{CodeJob, CodeSynthesisStage};
use crate::application::use_cases::generation::StageGenerator;
use crate::application::use_cases::locator_extraction::extract_locators;
use crate::application::use_cases::retry::RetryPolicy;
use crate::application::use_cases::test_case_synthesis::TestCaseSynthesisStage;
use crate::application::use_cases::validation::ValidationStage;
use crate::domain::cache_key::{recording_id_for, CacheKey};
use crate::domain::code_bundle::{CodeArtifact, TargetLanguage};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::locator::LocatorTable;
use crate::domain::pipeline::{
    CodeRequest, PipelineRequest, PipelineResult, PipelineState, StageReport,
};
use crate::domain::stage::StageName;
use crate::domain::stage_profile::StageProfiles;
use crate::domain::test_case::{parse_test_case_id, TestCase, TestCaseSet};
use crate::domain::ticket::{TicketDescriptor, TicketId};
use crate::domain::verdict::ValidationVerdict;
use crate::infrastructure::artifact_store::ArtifactCache;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::ticket_source::TicketSource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Cancellation handle for one run, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub min_description_chars: usize,
    pub default_languages: Vec<TargetLanguage>,
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_description_chars: 40,
            default_languages: vec![TargetLanguage::Python],
            retry: RetryPolicy::default(),
        }
    }
}

struct CodePlan {
    test_case_id: String,
    transcript: Option<String>,
    recording_id: Option<String>,
    languages: Vec<TargetLanguage>,
}

/// Sequences the stages for a ticket, serving every stage from the cache first.
pub struct Pipeline {
    tickets: Arc<dyn TicketSource>,
    cache: Arc<dyn ArtifactCache>,
    validation: ValidationStage,
    test_cases: TestCaseSynthesisStage,
    code: CodeSynthesisStage,
    retry: RetryPolicy,
    default_languages: Vec<TargetLanguage>,
    locks: KeyLocks,
}

impl Pipeline {
    pub fn new(
        tickets: Arc<dyn TicketSource>,
        cache: Arc<dyn ArtifactCache>,
        llm: Arc<dyn LLMClient>,
        llm_config: LLMConfig,
        profiles: StageProfiles,
        settings: PipelineSettings,
    ) -> Self {
        let generator = StageGenerator::new(llm, llm_config, settings.retry.clone());
        Self {
            tickets,
            cache,
            validation: ValidationStage::new(
                generator.clone(),
                profiles.validator,
                settings.min_description_chars,
            ),
            test_cases: TestCaseSynthesisStage::new(
                generator.clone(),
                profiles.test_case_generator,
            ),
            code: CodeSynthesisStage::new(generator, profiles.code_generator),
            retry: settings.retry,
            default_languages: settings.default_languages,
            locks: KeyLocks::new(),
        }
    }

    /// Validation and test cases for a ticket.
    pub async fn run(&self, ticket_id: &str) -> Result<PipelineResult> {
        self.run_with(PipelineRequest::for_ticket(ticket_id), &RunControl::new())
            .await
    }

    pub async fn run_with(
        &self,
        request: PipelineRequest,
        control: &RunControl,
    ) -> Result<PipelineResult> {
        let ticket_id = TicketId::parse(&request.ticket_id)
            .map_err(|e| e.in_stage(StageName::TicketFetch, request.ticket_id.trim()))?;
        let code_plan = request
            .code
            .as_ref()
            .map(|code| self.plan_code(code))
            .transpose()?;

        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("pipeline_run", run_id = %run_id, ticket_id = %ticket_id);
        let result = PipelineResult::new(run_id, ticket_id.to_string());

        self.execute(
            ticket_id,
            request.additional_info.as_deref(),
            code_plan,
            control,
            result,
        )
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        ticket_id: TicketId,
        additional_info: Option<&str>,
        code_plan: Option<CodePlan>,
        control: &RunControl,
        mut result: PipelineResult,
    ) -> Result<PipelineResult> {
        if stop_if_cancelled(control, &mut result) {
            return Ok(result);
        }

        let ticket = self.fetch_ticket(&ticket_id, &mut result).await?;
        let ticket = match additional_info {
            Some(info) => ticket.with_additional_info(info),
            None => ticket,
        };

        let verdict = self.validate(&ticket, &mut result).await?;
        result.state = match &verdict {
            ValidationVerdict::Invalid { .. } => PipelineState::Invalid,
            ValidationVerdict::NeedsMoreInfo { .. } => PipelineState::NeedsMoreInfo,
            ValidationVerdict::Ready => PipelineState::Ready,
        };
        result.verdict = Some(verdict);
        if result.state.is_terminal() {
            tracing::info!(state = ?result.state, "Pipeline halted by verdict");
            return Ok(result);
        }
        if stop_if_cancelled(control, &mut result) {
            return Ok(result);
        }

        let set = self.test_cases_for(&ticket, &mut result).await?;
        result.state = PipelineState::TestCasesGenerated;
        result.test_cases = Some(set.clone());

        let Some(plan) = code_plan else {
            return Ok(result);
        };
        if stop_if_cancelled(control, &mut result) {
            return Ok(result);
        }

        let test_case = set.get(&plan.test_case_id).cloned().ok_or_else(|| {
            AppError::NotFound(format!(
                "Test case {} is not part of {}",
                plan.test_case_id, ticket_id
            ))
            .in_stage(StageName::CodeSynthesis, plan.test_case_id.as_str())
        })?;

        let locators = plan.transcript.as_deref().map(|transcript| {
            let table = extract_locators(transcript);
            tracing::info!(locators = table.len(), "Locators extracted");
            result.stages.push(StageReport {
                stage: StageName::LocatorExtraction,
                key: plan.recording_id.clone().unwrap_or_default(),
                cache_hit: false,
            });
            table
        });
        if stop_if_cancelled(control, &mut result) {
            return Ok(result);
        }

        let artifact = self
            .code_for(&ticket_id, &test_case, &plan, locators.as_ref(), &mut result)
            .await?;
        result.state = PipelineState::CodeGenerated;
        result.code = Some(artifact);
        tracing::info!("Pipeline completed");
        Ok(result)
    }

    /// Replace the cached test cases for a ready ticket using reviewer feedback.
    pub async fn regenerate_test_cases(
        &self,
        ticket_id: &str,
        feedback: &str,
    ) -> Result<PipelineResult> {
        let ticket_id = TicketId::parse(ticket_id)
            .map_err(|e| e.in_stage(StageName::TicketFetch, ticket_id.trim()))?;
        let key = CacheKey::test_cases(&ticket_id);
        let scope = |err: AppError| err.in_stage(StageName::TestCaseSynthesis, key.to_string());
        if feedback.trim().is_empty() {
            return Err(scope(AppError::InputError(
                "Feedback is required to regenerate test cases.".to_string(),
            )));
        }

        let mut result = PipelineResult::new(Uuid::new_v4().to_string(), ticket_id.to_string());
        let ticket = self.fetch_ticket(&ticket_id, &mut result).await?;
        let verdict = self.validate(&ticket, &mut result).await?;
        if !verdict.is_ready() {
            return Err(scope(AppError::InputError(format!(
                "Ticket {} is not ready for test cases.",
                ticket_id
            ))));
        }
        result.verdict = Some(verdict);

        let _guard = self.locks.acquire(&key.to_string()).await;
        let current: TestCaseSet = self
            .read_cached(&key, &|_: &TestCaseSet| true)
            .await
            .map_err(scope)?
            .ok_or_else(|| {
                scope(AppError::NotFound(format!(
                    "No test cases cached for {}; run the pipeline first.",
                    ticket_id
                )))
            })?;

        let set = self
            .test_cases
            .regenerate(&ticket, &current, feedback)
            .await
            .map_err(scope)?;
        self.store(&key, &set).await.map_err(scope)?;
        tracing::info!(ticket_id = %ticket_id, key = %key, "Test cases replaced");

        result.stages.push(StageReport {
            stage: StageName::TestCaseSynthesis,
            key: key.to_string(),
            cache_hit: false,
        });
        result.state = PipelineState::TestCasesGenerated;
        result.test_cases = Some(set);
        Ok(result)
    }

    /// Test cases already generated for a ticket, if any.
    pub async fn cached_test_cases(&self, ticket_id: &str) -> Result<Option<TestCaseSet>> {
        let ticket_id = TicketId::parse(ticket_id)?;
        let key = CacheKey::test_cases(&ticket_id);
        self.read_cached(&key, &|_: &TestCaseSet| true)
            .await
            .map_err(|e| e.in_stage(StageName::TestCaseSynthesis, key.to_string()))
    }

    fn plan_code(&self, code: &CodeRequest) -> Result<CodePlan> {
        let test_case_id = parse_test_case_id(&code.test_case_id)
            .map_err(|e| e.in_stage(StageName::CodeSynthesis, code.test_case_id.trim()))?;
        let transcript = code
            .transcript
            .as_ref()
            .filter(|transcript| !transcript.trim().is_empty())
            .cloned();
        let supplied_recording = code
            .recording_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        if let (Some(recording_id), None) = (supplied_recording, &transcript) {
            return Err(AppError::InputError(format!(
                "Recording {} needs its transcript.",
                recording_id
            ))
            .in_stage(StageName::LocatorExtraction, recording_id));
        }
        let recording_id = supplied_recording
            .map(str::to_string)
            .or_else(|| transcript.as_deref().map(recording_id_for));
        let requested = if code.languages.is_empty() {
            &self.default_languages
        } else {
            &code.languages
        };
        let mut languages: Vec<TargetLanguage> = Vec::with_capacity(requested.len());
        for language in requested {
            if !languages.contains(language) {
                languages.push(*language);
            }
        }
        Ok(CodePlan {
            test_case_id,
            transcript,
            recording_id,
            languages,
        })
    }

    async fn fetch_ticket(
        &self,
        ticket_id: &TicketId,
        result: &mut PipelineResult,
    ) -> Result<TicketDescriptor> {
        let ticket = self
            .retry
            .run("ticket-fetch", || self.tickets.fetch(ticket_id))
            .await
            .map_err(|e| e.in_stage(StageName::TicketFetch, ticket_id.as_str()))?;
        result.stages.push(StageReport {
            stage: StageName::TicketFetch,
            key: ticket_id.to_string(),
            cache_hit: false,
        });
        Ok(ticket)
    }

    async fn validate(
        &self,
        ticket: &TicketDescriptor,
        result: &mut PipelineResult,
    ) -> Result<ValidationVerdict> {
        let key = CacheKey::validation(&ticket.id, &ticket.text);
        let outcome = self
            .cached_or_generate(
                StageName::Validation,
                &key,
                |_: &ValidationVerdict| true,
                || self.validation.validate(ticket),
            )
            .await;

        let (verdict, cache_hit) = match outcome {
            Ok(found) => found,
            // Too little text is a terminal verdict, not a failed run. It is never cached.
            Err(err) => match err.root() {
                AppError::InputError(reason) => {
                    tracing::info!(
                        ticket_id = %ticket.id,
                        reason = %reason,
                        "Ticket rejected before validation"
                    );
                    (
                        ValidationVerdict::Invalid {
                            reason: reason.clone(),
                        },
                        false,
                    )
                }
                _ => return Err(err),
            },
        };
        result.stages.push(StageReport {
            stage: StageName::Validation,
            key: key.to_string(),
            cache_hit,
        });
        Ok(verdict)
    }

    async fn test_cases_for(
        &self,
        ticket: &TicketDescriptor,
        result: &mut PipelineResult,
    ) -> Result<TestCaseSet> {
        let key = CacheKey::test_cases(&ticket.id);
        let (set, cache_hit) = self
            .cached_or_generate(
                StageName::TestCaseSynthesis,
                &key,
                |_: &TestCaseSet| true,
                || self.test_cases.synthesize(ticket),
            )
            .await?;
        result.stages.push(StageReport {
            stage: StageName::TestCaseSynthesis,
            key: key.to_string(),
            cache_hit,
        });
        Ok(set)
    }

    async fn code_for(
        &self,
        ticket_id: &TicketId,
        test_case: &TestCase,
        plan: &CodePlan,
        locators: Option<&LocatorTable>,
        result: &mut PipelineResult,
    ) -> Result<CodeArtifact> {
        let key = CacheKey::code(ticket_id, &test_case.id, plan.recording_id.as_deref());
        let (artifact, cache_hit) = self
            .cached_or_generate(
                StageName::CodeSynthesis,
                &key,
                |artifact: &CodeArtifact| artifact.serves(test_case, locators, &plan.languages),
                || {
                    self.code.synthesize(CodeJob {
                        ticket_id: ticket_id.as_str(),
                        test_case,
                        recording_id: plan.recording_id.as_deref(),
                        locators,
                        languages: &plan.languages,
                    })
                },
            )
            .await?;
        result.stages.push(StageReport {
            stage: StageName::CodeSynthesis,
            key: key.to_string(),
            cache_hit,
        });
        Ok(artifact)
    }

    /// Cache hit, or generate under the key's lock and store the validated value.
    ///
    /// A request that waited on the lock re-reads the cache before generating.
    async fn cached_or_generate<T, A, F, Fut>(
        &self,
        stage: StageName,
        key: &CacheKey,
        accept: A,
        generate: F,
    ) -> Result<(T, bool)>
    where
        T: Serialize + DeserializeOwned,
        A: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let scope = |err: AppError| err.in_stage(stage, key.to_string());

        if let Some(value) = self.read_cached(key, &accept).await.map_err(scope)? {
            tracing::debug!(stage = %stage, key = %key, "Cache hit");
            return Ok((value, true));
        }

        let _guard = self.locks.acquire(&key.to_string()).await;
        if let Some(value) = self.read_cached(key, &accept).await.map_err(scope)? {
            tracing::debug!(stage = %stage, key = %key, "Cache filled while waiting");
            return Ok((value, true));
        }

        tracing::info!(stage = %stage, key = %key, "Cache miss, generating");
        let value = generate().await.map_err(scope)?;
        self.store(key, &value).await.map_err(scope)?;
        Ok((value, false))
    }

    async fn read_cached<T, A>(&self, key: &CacheKey, accept: &A) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        A: Fn(&T) -> bool,
    {
        let entry = match self.cache.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(AppError::CacheCorruption(reason)) => {
                tracing::warn!(key = %key, reason = %reason, "Corrupt cache entry, regenerating");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        match serde_json::from_value::<T>(entry.payload) {
            Ok(value) if accept(&value) => Ok(Some(value)),
            Ok(_) => {
                tracing::debug!(key = %key, "Cached artifact does not cover the request");
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Unreadable cache payload, regenerating");
                Ok(None)
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let payload = serde_json::to_value(value)
            .map_err(|e| AppError::Internal(format!("Failed to encode artifact: {}", e)))?;
        self.cache.put(key, payload).await?;
        tracing::info!(key = %key, "Artifact cached");
        Ok(())
    }
}

fn stop_if_cancelled(control: &RunControl, result: &mut PipelineResult) -> bool {
    if control.is_cancelled() {
        result.cancelled = true;
        tracing::info!(state = ?result.state, "Run cancelled");
        return true;
    }
    false
}
