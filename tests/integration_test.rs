//! Integration tests for RepoLens
//!
//! Exercises the full analysis flow with in-memory fakes for the
//! repository source, the language model and the summarizer.

use async_trait::async_trait;
use repolens::agent::{AnalysisRequest, AnalysisType, Analyzer, SessionConfig, SessionPhase};
use repolens::context::{
    CompressorConfig, ContextCompressor, SharedContext, Summarizer, SummaryRequest, TokenAccountant,
};
use repolens::errors::{ContextError, ModelError, SourceError};
use repolens::models::LanguageModel;
use repolens::repository::{FileEntry, RepositoryInfo, RepositorySource};
use repolens::telemetry::{TelemetryCollector, TraceEvent};
use repolens::types::{Role, Turn};
use repolens::{AnalyzerError, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

struct FakeRepository {
    files: BTreeMap<String, String>,
}

impl FakeRepository {
    fn with_modules(modules: usize, module_size: usize) -> Self {
        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), "# widget\nParses widgets.".to_string());
        files.insert("package.json".to_string(), "{\"name\": \"widget\"}".to_string());
        for i in 0..modules {
            files.insert(format!("pkg{}/index.js", i), "y".repeat(module_size));
        }
        Self { files }
    }
}

#[async_trait]
impl RepositorySource for FakeRepository {
    async fn fetch_repository(&self, owner: &str, name: &str) -> std::result::Result<RepositoryInfo, SourceError> {
        let mut info = RepositoryInfo::new(format!("https://github.com/{}/{}", owner, name), owner, name);
        info.description = Some("Widget parser".to_string());
        info.languages.insert("JavaScript".to_string(), 9_000);
        info.languages.insert("Shell".to_string(), 1_000);
        Ok(info)
    }

    async fn list_files(&self, _repository: &RepositoryInfo) -> std::result::Result<Vec<FileEntry>, SourceError> {
        Ok(self
            .files
            .iter()
            .map(|(path, content)| FileEntry::new(path.clone(), content.len() as u64))
            .collect())
    }

    async fn fetch_file(&self, _repository: &RepositoryInfo, path: &str) -> std::result::Result<String, SourceError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }
}

/// Echoes how many turns it saw, and records every request
#[derive(Default)]
struct RecordingModel {
    requests: Mutex<Vec<Vec<Turn>>>,
}

#[async_trait]
impl LanguageModel for RecordingModel {
    async fn complete(&self, turns: &[Turn]) -> std::result::Result<Turn, ModelError> {
        self.requests.lock().unwrap().push(turns.to_vec());
        Ok(Turn::assistant(format!(
            "## Findings\nSaw {} turns.\n\n## Recommendations\n- Add a lock file\n- Document the API",
            turns.len()
        )))
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

struct FixedSummarizer;

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        Ok(format!("{} earlier turns condensed", request.turns.len()))
    }
}

/// Blocks until released, so a compression can be held in flight
struct GatedSummarizer {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Summarizer for GatedSummarizer {
    async fn summarize(&self, _request: &SummaryRequest) -> Result<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("gated summary".to_string())
    }
}

fn small_window() -> SessionConfig {
    SessionConfig {
        compressor: CompressorConfig {
            max_tokens: 600,
            trigger_ratio: 0.8,
            preserved_messages: 3,
            ..CompressorConfig::default()
        },
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_full_analysis_stays_within_window() {
    let model = Arc::new(RecordingModel::default());
    let collector = Arc::new(TelemetryCollector::new());
    let analyzer = Analyzer::new(Arc::new(FakeRepository::with_modules(12, 300)), model.clone(), small_window())
        .with_summarizer(Arc::new(FixedSummarizer))
        .with_tracer(collector.clone());

    let mut session = analyzer
        .start(AnalysisRequest::new("https://github.com/acme/widget.git", AnalysisType::Summary))
        .unwrap();
    let report = session.run().await.unwrap();

    assert_eq!(report.status, SessionPhase::Completed);
    assert_eq!(report.recommendations, vec!["Add a lock file", "Document the API"]);
    assert!(report.context.summary_count >= 1);
    assert!(report.context.current_tokens < 600);

    let repo = report.repository.as_ref().unwrap();
    assert_eq!(repo.name, "widget");
    assert_eq!(repo.files_analyzed.len(), 13);
    assert!(repo.security_files.is_empty());

    // the model never saw more than the window allows
    let accountant = TokenAccountant::heuristic();
    for request in model.requests.lock().unwrap().iter() {
        assert!(accountant.measure(request) < 600);
        assert!(request.iter().filter(|t| t.role() == Role::Summary).count() <= 1);
    }

    let stats = collector.get_stats();
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.sessions_succeeded, 1);
    assert_eq!(stats.compressions_completed, report.context.summary_count);
    assert_eq!(stats.phase_transitions, 3);
}

#[tokio::test]
async fn test_dependencies_analysis_reports_security_files() {
    let model = Arc::new(RecordingModel::default());
    let analyzer = Analyzer::new(Arc::new(FakeRepository::with_modules(2, 10)), model, SessionConfig::default())
        .with_summarizer(Arc::new(FixedSummarizer));

    let report = analyzer
        .analyze(AnalysisRequest::new("https://github.com/acme/widget", AnalysisType::Dependencies))
        .await
        .unwrap();

    let repo = report.repository.unwrap();
    assert_eq!(repo.security_files, vec!["package.json"]);
    assert_eq!(repo.files_analyzed.last().map(String::as_str), Some("package.json"));
    assert_eq!(repo.readme_content.as_deref(), Some("# widget\nParses widgets."));
}

#[tokio::test]
async fn test_follow_up_questions_go_through_the_window() {
    let model = Arc::new(RecordingModel::default());
    let analyzer = Analyzer::new(Arc::new(FakeRepository::with_modules(12, 300)), model.clone(), small_window())
        .with_summarizer(Arc::new(FixedSummarizer));
    let mut session = analyzer
        .start(AnalysisRequest::new("https://github.com/acme/widget", AnalysisType::Summary))
        .unwrap();
    session.run().await.unwrap();

    for question in ["Which module is largest?", "Is there a CLI?", "How is it tested?"] {
        session.ask(question).await.unwrap();
        assert!(session.context_stats().current_tokens < 600);
    }

    let last_request = model.requests.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last_request.last().unwrap().content(), "How is it tested?");
    assert_eq!(session.phase(), SessionPhase::Completed);
}

#[tokio::test]
async fn test_timeout_fails_session() {
    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _turns: &[Turn]) -> std::result::Result<Turn, ModelError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Turn::assistant("late"))
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    let config = SessionConfig {
        analysis_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    };
    let analyzer = Analyzer::new(Arc::new(FakeRepository::with_modules(1, 10)), Arc::new(SlowModel), config);
    let mut session = analyzer
        .start(AnalysisRequest::new("https://github.com/acme/widget", AnalysisType::Summary))
        .unwrap();

    let err = session.run().await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Timeout { duration_ms: 50 }));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert!(session.report().unwrap().error_message.is_some());
}

#[tokio::test]
async fn test_shared_context_rejects_append_during_compression() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let summarizer = Arc::new(GatedSummarizer {
        entered: entered.clone(),
        release: release.clone(),
    });
    let collector = Arc::new(TelemetryCollector::new());
    let compressor = ContextCompressor::new(
        CompressorConfig {
            max_tokens: 100,
            trigger_ratio: 0.85,
            preserved_messages: 2,
            ..CompressorConfig::default()
        },
        TokenAccountant::heuristic(),
        summarizer,
    )
    .with_tracer(collector.clone());
    let shared = SharedContext::new(compressor);

    for i in 0..6 {
        shared.append(Turn::user(format!("{:040}", i))).await.unwrap();
    }

    let crossing = {
        let shared = shared.clone();
        tokio::spawn(async move { shared.append(Turn::assistant("z".repeat(40))).await })
    };
    entered.notified().await;

    let rejected = shared.append(Turn::user("while compressing")).await;
    assert_eq!(
        rejected.unwrap_err(),
        ContextError::ConcurrentMutation { operation: "append" }
    );

    release.notify_one();
    let report = crossing.await.unwrap().unwrap();
    assert!(report.compression.is_some());
    assert_eq!(shared.snapshot().unwrap().len(), 3);

    let events = collector.recent_events(2);
    assert!(matches!(events[0], TraceEvent::CompressionTriggered { .. }));
    assert!(matches!(events[1], TraceEvent::CompressionCompleted { still_over_limit: false, .. }));
}
