//! Property tests for the context compressor
//!
//! Runs without a network or model: summaries come from an in-memory
//! summarizer that returns a short fixed text.

use async_trait::async_trait;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use repolens::context::{
    CompressionOutcome, CompressorConfig, CompressorPhase, ContextCompressor, Summarizer, SummaryRequest,
    TokenAccountant,
};
use repolens::types::Turn;
use repolens::{AnalyzerError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct CountingSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("summary {} of {} turns", n, request.turns.len()))
    }
}

struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _request: &SummaryRequest) -> Result<String> {
        Err(AnalyzerError::Validation("summarizer offline".to_string()))
    }
}

fn compressor(max_tokens: usize, ratio: f64, preserved: usize, summarizer: Arc<dyn Summarizer>) -> ContextCompressor {
    ContextCompressor::new(
        CompressorConfig {
            max_tokens,
            trigger_ratio: ratio,
            preserved_messages: preserved,
            ..CompressorConfig::default()
        },
        TokenAccountant::heuristic(),
        summarizer,
    )
}

fn turn(i: usize, chars: usize) -> Turn {
    let body = "x".repeat(chars);
    if i % 2 == 0 {
        Turn::user(body)
    } else {
        Turn::assistant(body)
    }
}

#[quickcheck]
fn prop_running_total_matches_measure(lengths: Vec<u8>, preserved: u8) -> TestResult {
    if lengths.is_empty() {
        return TestResult::discard();
    }
    let preserved = usize::from(preserved % 6);

    tokio_test::block_on(async move {
        let accountant = TokenAccountant::heuristic();
        let mut context = compressor(200, 0.85, preserved, Arc::new(CountingSummarizer::default()));

        for (i, len) in lengths.iter().enumerate() {
            let report = match context.append(turn(i, usize::from(*len))).await {
                Ok(report) => report,
                Err(_) => return TestResult::failed(),
            };

            let snapshot = context.snapshot();
            if report.info.current_tokens != accountant.measure(&snapshot) {
                return TestResult::failed();
            }
            if let Some(CompressionOutcome::Compressed(_)) = report.compression {
                if snapshot.len() != 1 + preserved || !snapshot[0].is_summary() {
                    return TestResult::failed();
                }
            }
        }
        TestResult::passed()
    })
}

#[quickcheck]
fn prop_tail_survives_compression(lengths: Vec<u8>) -> TestResult {
    if lengths.len() < 4 {
        return TestResult::discard();
    }

    tokio_test::block_on(async move {
        let mut context = compressor(1_000_000, 0.85, 3, Arc::new(CountingSummarizer::default()));
        let turns: Vec<Turn> = lengths
            .iter()
            .enumerate()
            .map(|(i, len)| turn(i, usize::from(*len) + 1))
            .collect();
        for t in &turns {
            if context.append(t.clone()).await.is_err() {
                return TestResult::failed();
            }
        }

        let outcome = context.compress().await;
        let snapshot = context.snapshot();
        TestResult::from_bool(
            matches!(outcome, CompressionOutcome::Compressed(_))
                && snapshot[1..] == turns[turns.len() - 3..]
                && context.info().summary_count == 1,
        )
    })
}

#[tokio::test]
async fn test_trigger_scenario_100_085_2() {
    let summarizer = Arc::new(CountingSummarizer::default());
    let mut context = compressor(100, 0.85, 2, summarizer.clone());

    // 4 overhead + 10 content = 14 tokens each; the 7th append reaches 98 ≥ 85
    let turns: Vec<Turn> = (0..7).map(|i| turn(i, 40)).collect();
    let mut compressions = 0;
    for (i, t) in turns.iter().enumerate() {
        let report = context.append(t.clone()).await.unwrap();
        if report.compression.is_some() {
            compressions += 1;
            assert_eq!(i, 6, "compression must wait for the crossing append");
        }
    }

    assert_eq!(compressions, 1);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    let snapshot = context.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[1..], turns[5..]);
    assert_eq!(context.phase(), CompressorPhase::Normal);
}

#[tokio::test]
async fn test_second_compress_is_noop() {
    let summarizer = Arc::new(CountingSummarizer::default());
    let mut context = compressor(10_000, 0.85, 2, summarizer.clone());
    for i in 0..6 {
        context.append(turn(i, 20)).await.unwrap();
    }

    assert!(matches!(context.compress().await, CompressionOutcome::Compressed(_)));
    let after_first = context.snapshot();
    let outcome = context.compress().await;

    assert!(matches!(outcome, CompressionOutcome::NothingToCompress { .. }));
    assert_eq!(context.snapshot(), after_first);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_summarizer_degrades_and_recovers() {
    let mut context = compressor(100, 0.85, 2, Arc::new(FailingSummarizer));
    let turns: Vec<Turn> = (0..6).map(|i| turn(i, 40)).collect();
    for t in &turns {
        context.append(t.clone()).await.unwrap();
    }

    let before = context.snapshot();
    let tokens_before = context.current_tokens();
    assert!(matches!(context.compress().await, CompressionOutcome::Failed(_)));
    assert_eq!(context.snapshot(), before);
    assert_eq!(context.current_tokens(), tokens_before);
    assert_eq!(context.phase(), CompressorPhase::Degraded);

    let report = context.append(turn(6, 40)).await.unwrap();
    assert!(report.compression.as_ref().is_some_and(|o| o.is_degraded()));
    assert_eq!(context.len(), 7);
}

#[tokio::test]
async fn test_single_turn_is_never_compressed() {
    let summarizer = Arc::new(CountingSummarizer::default());
    let mut context = compressor(100, 0.85, 5, summarizer.clone());
    context.append(turn(0, 12)).await.unwrap();

    assert!(matches!(
        context.compress().await,
        CompressionOutcome::NothingToCompress { .. }
    ));
    assert_eq!(context.len(), 1);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
}
