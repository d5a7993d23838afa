//! Analysis session
//!
//! Drives one repository analysis through the phase machine:
//! validate → fetch metadata and files → feed the conversation buffer →
//! ask the model → report. Every turn goes through the compressor, so the
//! conversation stays under the context ceiling however large the
//! repository is.

use crate::agent::analysis::{extract_recommendations, system_prompt, AnalysisReport, AnalysisType};
use crate::agent::state::{SessionEvent, SessionPhase};
use crate::context::{
    CompressionOutcome, CompressorConfig, ContextCompressor, ContextInfo, ModelSummarizer, Summarizer,
    TokenAccountant,
};
use crate::errors::{AnalyzerError, Result};
use crate::models::LanguageModel;
use crate::repository::{collect_files, FileLimits, FileSelector, RepositoryFile, RepositoryInfo, RepositorySource};
use crate::telemetry::{NullTracer, TraceEvent, Tracer};
use crate::types::Turn;
use crate::validation::{validate_github_url, GitHubTarget};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default bound on a whole analysis
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(300);

const FINAL_INSTRUCTION: &str =
    "All requested files have been provided. Write the analysis now, following the instructions above.";

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub analysis_timeout: Duration,
    pub compressor: CompressorConfig,
    pub file_limits: FileLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            compressor: CompressorConfig::default(),
            file_limits: FileLimits::default(),
        }
    }
}

/// What to analyze
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub repo_url: String,
    pub analysis_type: AnalysisType,
    pub custom_prompt: Option<String>,
}

impl AnalysisRequest {
    pub fn new(repo_url: impl Into<String>, analysis_type: AnalysisType) -> Self {
        Self {
            repo_url: repo_url.into(),
            analysis_type,
            custom_prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }
}

/// Builds analysis sessions from shared collaborators
pub struct Analyzer {
    source: Arc<dyn RepositorySource>,
    model: Arc<dyn LanguageModel>,
    summarizer: Arc<dyn Summarizer>,
    accountant: TokenAccountant,
    tracer: Arc<dyn Tracer>,
    config: SessionConfig,
}

impl Analyzer {
    /// Summaries are produced by `model` unless overridden
    pub fn new(source: Arc<dyn RepositorySource>, model: Arc<dyn LanguageModel>, config: SessionConfig) -> Self {
        let summarizer: Arc<dyn Summarizer> = Arc::new(ModelSummarizer::new(model.clone()));
        Self {
            source,
            model,
            summarizer,
            accountant: TokenAccountant::default(),
            tracer: Arc::new(NullTracer),
            config,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_accountant(mut self, accountant: TokenAccountant) -> Self {
        self.accountant = accountant;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Validate `request` and open a session in `Pending`
    pub fn start(&self, request: AnalysisRequest) -> Result<AnalysisSession> {
        let target = validate_github_url(&request.repo_url)?;
        let prompt_missing = request
            .custom_prompt
            .as_deref()
            .map_or(true, |p| p.trim().is_empty());
        if request.analysis_type.requires_prompt() && prompt_missing {
            return Err(AnalyzerError::Validation(
                "custom analysis requires a prompt".to_string(),
            ));
        }

        let context = ContextCompressor::new(
            self.config.compressor.clone(),
            self.accountant.clone(),
            self.summarizer.clone(),
        )
        .with_tracer(self.tracer.clone());

        Ok(AnalysisSession {
            session_id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().to_string(),
            request,
            target,
            source: self.source.clone(),
            model: self.model.clone(),
            tracer: self.tracer.clone(),
            file_limits: self.config.file_limits,
            analysis_timeout: self.config.analysis_timeout,
            context,
            phase: SessionPhase::Pending,
            repository: None,
            report: None,
            started: Instant::now(),
            created_at: Utc::now(),
        })
    }

    /// Start and run a session in one call
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport> {
        let mut session = self.start(request)?;
        session.run().await
    }
}

/// One repository analysis and its conversation
pub struct AnalysisSession {
    session_id: String,
    trace_id: String,
    request: AnalysisRequest,
    target: GitHubTarget,
    source: Arc<dyn RepositorySource>,
    model: Arc<dyn LanguageModel>,
    tracer: Arc<dyn Tracer>,
    file_limits: FileLimits,
    analysis_timeout: Duration,
    context: ContextCompressor,
    phase: SessionPhase,
    repository: Option<RepositoryInfo>,
    report: Option<AnalysisReport>,
    started: Instant,
    created_at: DateTime<Utc>,
}

impl AnalysisSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn target(&self) -> &GitHubTarget {
        &self.target
    }

    pub fn repository(&self) -> Option<&RepositoryInfo> {
        self.repository.as_ref()
    }

    /// Last report produced by `run`
    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    /// Context window accounting, available in every phase
    pub fn context_stats(&self) -> ContextInfo {
        self.context.info()
    }

    /// Conversation so far, oldest first
    pub fn conversation(&self) -> Vec<Turn> {
        self.context.snapshot()
    }

    /// Run the analysis to a terminal phase
    ///
    /// Any error moves the session to `Failed`; the failure report is kept
    /// and the error is returned unchanged.
    pub async fn run(&mut self) -> Result<AnalysisReport> {
        self.phase.transition(SessionEvent::BeginFetch)?;

        info!(
            session_id = %self.session_id,
            repository = %self.request.repo_url,
            analysis_type = %self.request.analysis_type,
            "starting analysis"
        );
        self.tracer.record(TraceEvent::SessionStarted {
            session_id: self.session_id.clone(),
            repository: format!("{}/{}", self.target.owner, self.target.repo),
            analysis_type: self.request.analysis_type.to_string(),
            timestamp: Instant::now(),
        });

        let timeout = self.analysis_timeout;
        let result = match tokio::time::timeout(timeout, self.execute()).await {
            Ok(result) => result,
            Err(_) => Err(AnalyzerError::Timeout {
                duration_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(summary) => {
                let report = self.build_report(Some(summary), None);
                self.finish(report.clone());
                Ok(report)
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "analysis failed");
                if !self.phase.is_terminal() {
                    self.advance(SessionEvent::Fail)?;
                }
                let report = self.build_report(None, Some(e.to_string()));
                self.finish(report);
                Err(e)
            }
        }
    }

    /// Ask a follow-up question about a completed analysis
    ///
    /// The question and the answer both go through the compressor.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        if self.phase != SessionPhase::Completed {
            return Err(AnalyzerError::InvalidTransition {
                from: format!("{:?}", self.phase),
                event: "Ask".to_string(),
                reason: "follow-up questions need a completed analysis".to_string(),
            });
        }

        self.append(Turn::user(question)).await?;
        let answer = self.complete().await?;

        if let Some(report) = self.report.as_mut() {
            report.context = self.context.info();
        }
        Ok(answer)
    }

    async fn execute(&mut self) -> Result<String> {
        self.advance(SessionEvent::BeginFetch)?;

        let mut repository = self
            .source
            .fetch_repository(&self.target.owner, &self.target.repo)
            .await?;
        let selector = FileSelector::new(
            self.request.analysis_type.includes_security_files(),
            self.file_limits,
        );
        let files = collect_files(self.source.as_ref(), &mut repository, &selector).await?;
        debug!(
            files = files.len(),
            security_files = repository.security_files.len(),
            "repository loaded"
        );
        let overview = repository.overview();
        self.repository = Some(repository);
        self.advance(SessionEvent::RepositoryLoaded)?;

        let prompt = system_prompt(self.request.analysis_type, self.request.custom_prompt.as_deref());
        self.append(Turn::system(prompt)).await?;
        self.append(Turn::user(overview)).await?;

        let ceiling = self.context.config().trigger_tokens();
        for file in &files {
            let turn = file_turn(file);
            let cost = self.context.measure(&turn);
            if cost >= ceiling {
                warn!(path = %file.path, tokens = cost, ceiling, "file too large for the context window, skipping");
                continue;
            }
            self.append(turn).await?;
        }

        self.append(Turn::user(FINAL_INSTRUCTION)).await?;
        let summary = self.complete().await?;

        self.advance(SessionEvent::AnalysisComplete)?;
        Ok(summary)
    }

    /// Model reply to the current conversation, appended to it
    async fn complete(&mut self) -> Result<String> {
        let reply = self.model.complete(&self.context.snapshot()).await?;
        let text = reply.content().to_string();
        self.append(reply).await?;
        Ok(text)
    }

    async fn append(&mut self, turn: Turn) -> Result<()> {
        let report = self.context.append(turn).await?;
        match report.compression {
            Some(CompressionOutcome::Failed(reason)) => {
                warn!(session_id = %self.session_id, %reason, "context compression failed, continuing degraded")
            }
            Some(CompressionOutcome::StillOverLimit(_)) => {
                warn!(
                    session_id = %self.session_id,
                    tokens = report.info.current_tokens,
                    "context still over the trigger after compression"
                )
            }
            _ => {}
        }
        Ok(())
    }

    fn advance(&mut self, event: SessionEvent) -> Result<()> {
        let next = self.phase.transition(event)?;
        debug!(from = %self.phase, to = %next, ?event, "session phase change");
        self.tracer.record(TraceEvent::PhaseChanged {
            from: self.phase.to_string(),
            to: next.to_string(),
            timestamp: Instant::now(),
        });
        self.phase = next;
        Ok(())
    }

    fn build_report(&self, summary: Option<String>, error_message: Option<String>) -> AnalysisReport {
        let recommendations = summary
            .as_deref()
            .map(extract_recommendations)
            .unwrap_or_default();

        AnalysisReport {
            session_id: self.session_id.clone(),
            trace_id: self.trace_id.clone(),
            analysis_type: self.request.analysis_type,
            status: self.phase,
            summary,
            recommendations,
            processing_time_ms: self.started.elapsed().as_millis() as u64,
            error_message,
            repository: self.repository.clone(),
            context: self.context.info(),
            created_at: self.created_at,
        }
    }

    fn finish(&mut self, report: AnalysisReport) {
        info!(
            session_id = %self.session_id,
            status = %report.status,
            processing_time_ms = report.processing_time_ms,
            tokens = report.context.current_tokens,
            summaries = report.context.summary_count,
            "analysis finished"
        );
        self.tracer.record(TraceEvent::SessionFinished {
            session_id: self.session_id.clone(),
            success: report.is_success(),
            duration_ms: report.processing_time_ms,
            timestamp: Instant::now(),
        });
        self.report = Some(report);
    }
}

/// User turn carrying one file
fn file_turn(file: &RepositoryFile) -> Turn {
    Turn::user(format!("File: {}\n```\n{}\n```", file.path, file.content)).with_payload(json!({
        "path": file.path,
        "size": file.size,
        "security_relevant": file.security_relevant,
    }))
}
