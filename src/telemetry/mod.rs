//! Telemetry for RepoLens
//!
//! Structured trace events for external monitoring. Recording is
//! infallible: a broken sink is skipped, never allowed to stall a session.

use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

/// Trace event types
#[derive(Debug, Clone)]
pub enum TraceEvent {
    SessionStarted {
        session_id: String,
        repository: String,
        analysis_type: String,
        timestamp: Instant,
    },
    PhaseChanged {
        from: String,
        to: String,
        timestamp: Instant,
    },
    CompressionTriggered {
        tokens_before: usize,
        turns_before: usize,
        summary_count: usize,
        timestamp: Instant,
    },
    CompressionCompleted {
        tokens_before: usize,
        tokens_after: usize,
        turns_summarized: usize,
        still_over_limit: bool,
        timestamp: Instant,
    },
    CompressionFailed {
        reason: String,
        timestamp: Instant,
    },
    SessionFinished {
        session_id: String,
        success: bool,
        duration_ms: u64,
        timestamp: Instant,
    },
}

/// Observability sink
pub trait Tracer: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn record(&self, _event: TraceEvent) {}
}

/// Forwards events to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn record(&self, event: TraceEvent) {
        match event {
            TraceEvent::SessionStarted {
                session_id,
                repository,
                analysis_type,
                ..
            } => info!(target: "repolens::trace", %session_id, %repository, %analysis_type, "session started"),
            TraceEvent::PhaseChanged { from, to, .. } => {
                info!(target: "repolens::trace", %from, %to, "phase changed")
            }
            TraceEvent::CompressionTriggered {
                tokens_before,
                turns_before,
                summary_count,
                ..
            } => info!(target: "repolens::trace", tokens_before, turns_before, summary_count, "compression triggered"),
            TraceEvent::CompressionCompleted {
                tokens_before,
                tokens_after,
                turns_summarized,
                still_over_limit,
                ..
            } => info!(
                target: "repolens::trace",
                tokens_before,
                tokens_after,
                turns_summarized,
                still_over_limit,
                "compression completed"
            ),
            TraceEvent::CompressionFailed { reason, .. } => {
                info!(target: "repolens::trace", %reason, "compression failed")
            }
            TraceEvent::SessionFinished {
                session_id,
                success,
                duration_ms,
                ..
            } => info!(target: "repolens::trace", %session_id, success, duration_ms, "session finished"),
        }
    }
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub sessions_started: usize,
    pub sessions_succeeded: usize,
    pub sessions_failed: usize,
    pub phase_transitions: usize,
    pub compressions_triggered: usize,
    pub compressions_completed: usize,
    pub compressions_failed: usize,
    pub tokens_reclaimed: usize,
}

/// In-memory telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TraceEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TraceEvent> {
        match self.events.lock() {
            Ok(events) => {
                let start = events.len().saturating_sub(n);
                events[start..].to_vec()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Share of triggered compressions that completed
    pub fn compression_success_rate(&self) -> f64 {
        let stats = self.get_stats();
        let total = stats.compressions_completed + stats.compressions_failed;
        if total == 0 {
            1.0
        } else {
            stats.compressions_completed as f64 / total as f64
        }
    }

    /// Render summary statistics
    pub fn summary(&self) -> String {
        let stats = self.get_stats();
        let mut out = String::from("\n📊 Session Summary\n");
        out.push_str("─────────────────────────────────────\n");
        out.push_str(&format!("Duration:            {:?}\n", self.elapsed()));
        out.push_str(&format!("Phase transitions:   {}\n", stats.phase_transitions));
        out.push_str(&format!("Compressions:        {}\n", stats.compressions_completed));
        out.push_str(&format!("Failed compressions: {}\n", stats.compressions_failed));
        out.push_str(&format!("Tokens reclaimed:    {}\n", stats.tokens_reclaimed));
        out
    }

    /// Display summary statistics on stdout
    pub fn display_summary(&self) {
        println!("{}", self.summary());
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for TelemetryCollector {
    fn record(&self, event: TraceEvent) {
        if let Ok(mut stats) = self.stats.lock() {
            match &event {
                TraceEvent::SessionStarted { .. } => stats.sessions_started += 1,
                TraceEvent::PhaseChanged { .. } => stats.phase_transitions += 1,
                TraceEvent::CompressionTriggered { .. } => stats.compressions_triggered += 1,
                TraceEvent::CompressionCompleted {
                    tokens_before,
                    tokens_after,
                    ..
                } => {
                    stats.compressions_completed += 1;
                    stats.tokens_reclaimed += tokens_before.saturating_sub(*tokens_after);
                }
                TraceEvent::CompressionFailed { .. } => stats.compressions_failed += 1,
                TraceEvent::SessionFinished { success, .. } => {
                    if *success {
                        stats.sessions_succeeded += 1;
                    } else {
                        stats.sessions_failed += 1;
                    }
                }
            }
        }

        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Records into several sinks
#[derive(Clone, Default)]
pub struct FanoutTracer {
    sinks: Vec<Arc<dyn Tracer>>,
}

impl FanoutTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Tracer>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Tracer for FanoutTracer {
    fn record(&self, event: TraceEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}
