//! Context compression with bounded token usage
//!
//! The compressor owns the conversation buffer. After every append it asks
//! the accountant for the running cost and, once usage reaches
//! `trigger_ratio × max_tokens`, replaces everything but the newest
//! `preserved_messages` turns with one synthetic summary turn.
//!
//! ```text
//! buffer:  [s?, h₁, h₂, …, hₖ | t₁, …, tₙ]      n = preserved_messages
//!           └──── head ─────┘  └─ tail ─┘
//! after:   [s'] + [t₁, …, tₙ]   where s' = summarize(s?, h₁…hₖ)
//! ```
//!
//! Guarantees:
//! - `current_tokens` always equals the sum of per-turn costs
//! - at most one summary turn, always first
//! - the tail is copied verbatim and in order
//! - a failed or timed-out summary leaves the buffer untouched
//! - compression never recurses; a still-oversized result is `Degraded`

use crate::context::counter::TokenAccountant;
use crate::context::summarizer::{Summarizer, SummaryRequest};
use crate::errors::{CompressionFailed, ContextError, ContextResult};
use crate::telemetry::{NullTracer, TraceEvent, Tracer};
use crate::types::Turn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Hard context ceiling (tokens)
pub const DEFAULT_MAX_TOKENS: usize = 200_000;

/// Share of the ceiling that triggers compression
pub const DEFAULT_TRIGGER_RATIO: f64 = 0.85;

/// Trailing turns exempt from compression
pub const DEFAULT_PRESERVED_MESSAGES: usize = 5;

/// Upper bound on one summarization call
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(300);

/// Compressor settings, fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorConfig {
    pub max_tokens: usize,
    pub trigger_ratio: f64,
    pub preserved_messages: usize,
    pub summary_timeout: Duration,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            trigger_ratio: DEFAULT_TRIGGER_RATIO,
            preserved_messages: DEFAULT_PRESERVED_MESSAGES,
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }
}

impl CompressorConfig {
    /// Smallest token count that triggers compression
    ///
    /// `⌈max_tokens × trigger_ratio⌉`, tolerant of float noise so that
    /// 100 × 0.85 yields 85 rather than 86.
    pub fn trigger_tokens(&self) -> usize {
        let raw = self.max_tokens as f64 * self.trigger_ratio;
        (raw - 1e-9).ceil().max(0.0) as usize
    }
}

/// Compressor phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressorPhase {
    /// Usage below the trigger, or last compression succeeded
    Normal,

    /// Summarization in flight; the buffer is exclusively held
    Compressing,

    /// Last compression failed or could not get under the trigger
    Degraded,
}

/// Snapshot of the context window accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub current_tokens: usize,
    pub max_tokens: usize,
    pub summary_count: usize,
    pub last_summary: String,
    pub preserved_messages: usize,
}

impl ContextInfo {
    /// Fraction of the ceiling in use
    pub fn usage_ratio(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.current_tokens as f64 / self.max_tokens as f64
    }
}

/// Compression statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionStats {
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub turns_before: usize,
    pub turns_after: usize,
    pub turns_summarized: usize,
}

impl CompressionStats {
    pub fn token_reduction(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    pub fn token_reduction_percent(&self) -> f64 {
        if self.tokens_before == 0 {
            return 0.0;
        }
        (self.token_reduction() as f64 / self.tokens_before as f64) * 100.0
    }
}

/// Result of one `compress()` call
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionOutcome {
    /// Head replaced by a summary; usage back under the trigger
    Compressed(CompressionStats),

    /// Nothing eligible for summarization; buffer unchanged
    NothingToCompress { current_tokens: usize },

    /// Head replaced, but the result still meets the trigger
    StillOverLimit(CompressionStats),

    /// Summarizer failed; buffer unchanged
    Failed(CompressionFailed),
}

impl CompressionOutcome {
    /// Whether this outcome left the compressor `Degraded`
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            CompressionOutcome::StillOverLimit(_) | CompressionOutcome::Failed(_)
        )
    }

    /// Whether the buffer was replaced
    pub fn replaced_buffer(&self) -> bool {
        matches!(
            self,
            CompressionOutcome::Compressed(_) | CompressionOutcome::StillOverLimit(_)
        )
    }

    pub fn stats(&self) -> Option<&CompressionStats> {
        match self {
            CompressionOutcome::Compressed(stats) | CompressionOutcome::StillOverLimit(stats) => {
                Some(stats)
            }
            _ => None,
        }
    }
}

/// What an append did
#[derive(Debug, Clone, PartialEq)]
pub struct AppendReport {
    /// Accounting after the append (and compression, if any)
    pub info: ContextInfo,

    /// Set when the append crossed the trigger
    pub compression: Option<CompressionOutcome>,
}

#[derive(Debug, Clone)]
struct MeasuredTurn {
    turn: Turn,
    tokens: usize,
}

/// Resets the phase to `Degraded` if a compression future is dropped
/// while the summarizer is still running.
struct PhaseGuard<'a> {
    phase: &'a mut CompressorPhase,
    armed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a mut CompressorPhase) -> Self {
        *phase = CompressorPhase::Compressing;
        Self { phase, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.phase = CompressorPhase::Degraded;
        }
    }
}

/// Conversation buffer with automatic compression
pub struct ContextCompressor {
    config: CompressorConfig,
    accountant: TokenAccountant,
    summarizer: Arc<dyn Summarizer>,
    tracer: Arc<dyn Tracer>,
    buffer: Vec<MeasuredTurn>,
    current_tokens: usize,
    summary_count: usize,
    last_summary: String,
    phase: CompressorPhase,
}

impl ContextCompressor {
    /// Create an empty buffer
    pub fn new(
        config: CompressorConfig,
        accountant: TokenAccountant,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            config,
            accountant,
            summarizer,
            tracer: Arc::new(NullTracer),
            buffer: Vec::new(),
            current_tokens: 0,
            summary_count: 0,
            last_summary: String::new(),
            phase: CompressorPhase::Normal,
        }
    }

    /// Send compression events to `tracer`
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn accountant(&self) -> &TokenAccountant {
        &self.accountant
    }

    pub fn phase(&self) -> CompressorPhase {
        self.phase
    }

    pub fn current_tokens(&self) -> usize {
        self.current_tokens
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Turns in chronological order
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.buffer.iter().map(|m| &m.turn)
    }

    /// Owned copy of the buffer for building a model request
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns().cloned().collect()
    }

    /// Current accounting snapshot
    pub fn info(&self) -> ContextInfo {
        ContextInfo {
            current_tokens: self.current_tokens,
            max_tokens: self.config.max_tokens,
            summary_count: self.summary_count,
            last_summary: self.last_summary.clone(),
            preserved_messages: self.config.preserved_messages,
        }
    }

    /// Cost `turn` would add if appended
    pub fn measure(&self, turn: &Turn) -> usize {
        self.accountant.measure_turn(turn)
    }

    /// Whether usage has reached the trigger
    pub fn needs_compression(&self) -> bool {
        self.current_tokens >= self.config.trigger_tokens()
    }

    /// Append a turn, compressing before returning if the trigger is reached
    ///
    /// A failed compression does not fail the append: the outcome is
    /// reported in `AppendReport::compression` and the turn stays appended.
    pub async fn append(&mut self, turn: Turn) -> ContextResult<AppendReport> {
        if turn.is_summary() {
            return Err(ContextError::SummaryRoleReserved);
        }

        let tokens = self.accountant.measure_turn(&turn);
        debug!(role = %turn.role(), tokens, "appending turn");
        self.buffer.push(MeasuredTurn { turn, tokens });
        self.recount();

        let compression = if self.needs_compression() {
            Some(self.compress().await)
        } else {
            None
        };

        Ok(AppendReport {
            info: self.info(),
            compression,
        })
    }

    /// Summarize everything but the newest `preserved_messages` turns
    pub async fn compress(&mut self) -> CompressionOutcome {
        let split = self.buffer.len().saturating_sub(self.config.preserved_messages);
        let has_prior_summary = self.buffer.first().is_some_and(|m| m.turn.is_summary());
        let first_fresh = usize::from(has_prior_summary);

        // Only the earlier summary (or nothing) sits in the head
        if split <= first_fresh {
            debug!(
                turns = self.buffer.len(),
                preserved = self.config.preserved_messages,
                "nothing eligible for compression"
            );
            return CompressionOutcome::NothingToCompress {
                current_tokens: self.current_tokens,
            };
        }

        let request = SummaryRequest {
            previous_summary: has_prior_summary.then(|| self.buffer[0].turn.content().to_string()),
            turns: self.buffer[first_fresh..split]
                .iter()
                .map(|m| m.turn.clone())
                .collect(),
        };
        let tokens_before = self.current_tokens;
        let turns_before = self.buffer.len();
        let turns_summarized = request.turns.len();

        info!(
            tokens = tokens_before,
            trigger = self.config.trigger_tokens(),
            turns_summarized,
            cumulative = has_prior_summary,
            "compressing conversation history"
        );
        self.tracer.record(TraceEvent::CompressionTriggered {
            tokens_before,
            turns_before,
            summary_count: self.summary_count,
            timestamp: Instant::now(),
        });

        let timeout = self.config.summary_timeout;
        let guard = PhaseGuard::enter(&mut self.phase);
        let summarized = tokio::time::timeout(timeout, self.summarizer.summarize(&request)).await;
        guard.disarm();

        let summary = match summarized {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => return self.fail(CompressionFailed::EmptySummary),
            Ok(Err(e)) => return self.fail(CompressionFailed::Summarizer(e.to_string())),
            Err(_) => {
                return self.fail(CompressionFailed::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                })
            }
        };

        // All-or-nothing replace: nothing above this line touched the buffer
        let summary_turn = Turn::summary(summary.clone());
        let summary_tokens = self.accountant.measure_turn(&summary_turn);
        let tail = self.buffer.split_off(split);
        self.buffer.clear();
        self.buffer.push(MeasuredTurn {
            turn: summary_turn,
            tokens: summary_tokens,
        });
        self.buffer.extend(tail);
        self.summary_count += 1;
        self.last_summary = summary;
        self.recount();

        let stats = CompressionStats {
            tokens_before,
            tokens_after: self.current_tokens,
            turns_before,
            turns_after: self.buffer.len(),
            turns_summarized,
        };
        let still_over_limit = self.needs_compression();
        self.tracer.record(TraceEvent::CompressionCompleted {
            tokens_before,
            tokens_after: stats.tokens_after,
            turns_summarized,
            still_over_limit,
            timestamp: Instant::now(),
        });

        if still_over_limit {
            self.phase = CompressorPhase::Degraded;
            warn!(
                tokens = stats.tokens_after,
                trigger = self.config.trigger_tokens(),
                "context still over trigger after compression; preserved turns are too large"
            );
            CompressionOutcome::StillOverLimit(stats)
        } else {
            self.phase = CompressorPhase::Normal;
            info!(
                before = stats.tokens_before,
                after = stats.tokens_after,
                reduction_pct = stats.token_reduction_percent(),
                summary_count = self.summary_count,
                "compression complete"
            );
            CompressionOutcome::Compressed(stats)
        }
    }

    fn fail(&mut self, failure: CompressionFailed) -> CompressionOutcome {
        self.phase = CompressorPhase::Degraded;
        warn!(error = %failure, tokens = self.current_tokens, "compression failed; continuing uncompressed");
        self.tracer.record(TraceEvent::CompressionFailed {
            reason: failure.to_string(),
            timestamp: Instant::now(),
        });
        CompressionOutcome::Failed(failure)
    }

    fn recount(&mut self) {
        self.current_tokens = self.buffer.iter().map(|m| m.tokens).sum();
    }
}

impl std::fmt::Debug for ContextCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCompressor")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("turns", &self.buffer.len())
            .field("current_tokens", &self.current_tokens)
            .field("summary_count", &self.summary_count)
            .finish()
    }
}
