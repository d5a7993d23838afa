//! Token accounting for conversation turns
//!
//! The accountant prices a turn as a fixed per-turn overhead (role and
//! formatting tokens) plus the tokens of its content and payload. Counting
//! is delegated to a pluggable `TokenCounter`; when it is unavailable the
//! accountant falls back to the character heuristic, which rounds up.
//!
//! # Algorithm
//!
//! ```text
//! cost(turn)   = overhead + count(content) + count(payload_json)
//! measure(ts)  = Σ cost(t) for t in ts
//! heuristic(s) = ⌈chars(s) / 4⌉
//! ```

use crate::errors::MeasurementError;
use crate::types::Turn;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Tokens charged per turn for role markers and message framing
pub const PER_TURN_OVERHEAD: usize = 4;

/// Pluggable token-counting function
pub trait TokenCounter: Send + Sync + fmt::Debug {
    /// Count tokens in `text`
    fn count(&self, text: &str) -> Result<usize, MeasurementError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Character-based heuristic counter (1 token ≈ 4 characters)
#[derive(Debug, Clone, Default)]
pub struct HeuristicCounter;

impl HeuristicCounter {
    pub fn new() -> Self {
        Self
    }

    /// Estimate token count for text
    ///
    /// Ceiling division so the estimate never undercounts a partial token.
    ///
    /// ```
    /// # use repolens::context::counter::HeuristicCounter;
    /// let counter = HeuristicCounter::new();
    /// assert_eq!(counter.estimate(&"a".repeat(100)), 25);
    /// assert_eq!(counter.estimate("a"), 1);
    /// ```
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        (char_count + 3) / 4
    }
}

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> Result<usize, MeasurementError> {
        Ok(self.estimate(text))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Counter backed by a HuggingFace `tokenizer.json`
pub struct TokenizerCounter {
    tokenizer: tokenizers::Tokenizer,
}

impl TokenizerCounter {
    /// Load a tokenizer definition from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MeasurementError> {
        let path = path.as_ref();
        let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            MeasurementError::new(format!("failed to load {}: {}", path.display(), e))
        })?;
        Ok(Self { tokenizer })
    }
}

impl fmt::Debug for TokenizerCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizerCounter").finish_non_exhaustive()
    }
}

impl TokenCounter for TokenizerCounter {
    fn count(&self, text: &str) -> Result<usize, MeasurementError> {
        self.tokenizer
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| MeasurementError::new(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "tokenizer"
    }
}

/// Measures the token cost of ordered turn sequences
#[derive(Debug, Clone)]
pub struct TokenAccountant {
    counter: Arc<dyn TokenCounter>,
    fallback: HeuristicCounter,
    per_turn_overhead: usize,
}

impl TokenAccountant {
    /// Create an accountant around a counting function
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            fallback: HeuristicCounter,
            per_turn_overhead: PER_TURN_OVERHEAD,
        }
    }

    /// Accountant using only the character heuristic
    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicCounter))
    }

    /// Override the per-turn overhead
    pub fn with_overhead(mut self, per_turn_overhead: usize) -> Self {
        self.per_turn_overhead = per_turn_overhead;
        self
    }

    pub fn per_turn_overhead(&self) -> usize {
        self.per_turn_overhead
    }

    pub fn counter_name(&self) -> &'static str {
        self.counter.name()
    }

    /// Cost of one turn, surfacing counter failures
    pub fn try_measure_turn(&self, turn: &Turn) -> Result<usize, MeasurementError> {
        let mut tokens = self.per_turn_overhead + self.counter.count(turn.content())?;
        if let Some(payload) = turn.payload() {
            tokens += self.counter.count(&payload.to_string())?;
        }
        Ok(tokens)
    }

    /// Cost of one turn; never fails
    ///
    /// A counter failure is logged and priced with the heuristic instead.
    pub fn measure_turn(&self, turn: &Turn) -> usize {
        match self.try_measure_turn(turn) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(
                    counter = self.counter.name(),
                    error = %e,
                    "token counter unavailable, falling back to character heuristic"
                );
                self.heuristic_cost(turn)
            }
        }
    }

    /// Total cost of a sequence, surfacing counter failures
    pub fn try_measure(&self, turns: &[Turn]) -> Result<usize, MeasurementError> {
        turns.iter().map(|turn| self.try_measure_turn(turn)).sum()
    }

    /// Total cost of a sequence: the sum of the per-turn costs
    pub fn measure(&self, turns: &[Turn]) -> usize {
        turns.iter().map(|turn| self.measure_turn(turn)).sum()
    }

    fn heuristic_cost(&self, turn: &Turn) -> usize {
        let payload = turn
            .payload()
            .map(|p| self.fallback.estimate(&p.to_string()))
            .unwrap_or(0);
        self.per_turn_overhead + self.fallback.estimate(turn.content()) + payload
    }
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::heuristic()
    }
}
