//! Analysis session state machine
//!
//! A strict finite state machine:
//! - Safety: no invalid phase reachable
//! - Determinism: unique next phase per event
//! - Terminal phases (`Completed`, `Failed`) accept no further events

use crate::errors::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Created, nothing fetched yet
    Pending,

    /// Reading repository metadata and files
    Fetching,

    /// Conversation with the model in progress
    Analyzing,

    /// Report produced (terminal)
    Completed,

    /// Unrecoverable error (terminal)
    Failed,
}

/// Events that trigger phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// URL validated, start reading the repository
    BeginFetch,

    /// Metadata and files are in hand
    RepositoryLoaded,

    /// The model produced the analysis
    AnalysisComplete,

    /// Any error on the way
    Fail,
}

impl SessionPhase {
    /// Check if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }

    /// Attempt a transition
    ///
    /// Valid transitions (6 edges):
    /// 1. Pending   → Fetching   (on: BeginFetch)
    /// 2. Pending   → Failed     (on: Fail)
    /// 3. Fetching  → Analyzing  (on: RepositoryLoaded)
    /// 4. Fetching  → Failed     (on: Fail)
    /// 5. Analyzing → Completed  (on: AnalysisComplete)
    /// 6. Analyzing → Failed     (on: Fail)
    pub fn transition(&self, event: SessionEvent) -> Result<SessionPhase> {
        use SessionEvent::*;
        use SessionPhase::*;

        let next = match (self, event) {
            (Pending, BeginFetch) => Fetching,
            (Fetching, RepositoryLoaded) => Analyzing,
            (Analyzing, AnalysisComplete) => Completed,
            (Pending | Fetching | Analyzing, Fail) => Failed,

            (from, event) => {
                let reason = if from.is_terminal() {
                    format!("{:?} is terminal", from)
                } else {
                    format!("No valid transition from {:?} on {:?}", from, event)
                };
                return Err(AnalyzerError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                    reason,
                });
            }
        };

        Ok(next)
    }

    /// All valid events from this phase
    pub fn valid_events(&self) -> Vec<SessionEvent> {
        use SessionEvent::*;
        use SessionPhase::*;

        match self {
            Pending => vec![BeginFetch, Fail],
            Fetching => vec![RepositoryLoaded, Fail],
            Analyzing => vec![AnalysisComplete, Fail],
            Completed | Failed => vec![],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Pending => "pending",
            SessionPhase::Fetching => "fetching",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }

    /// Human-readable phase name
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionPhase::Pending => "Pending",
            SessionPhase::Fetching => "Fetching Repository",
            SessionPhase::Analyzing => "Analyzing",
            SessionPhase::Completed => "Completed",
            SessionPhase::Failed => "Failed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [SessionPhase; 5] = [
        SessionPhase::Pending,
        SessionPhase::Fetching,
        SessionPhase::Analyzing,
        SessionPhase::Completed,
        SessionPhase::Failed,
    ];

    const ALL_EVENTS: [SessionEvent; 4] = [
        SessionEvent::BeginFetch,
        SessionEvent::RepositoryLoaded,
        SessionEvent::AnalysisComplete,
        SessionEvent::Fail,
    ];

    #[test]
    fn test_happy_path() {
        let phase = SessionPhase::Pending
            .transition(SessionEvent::BeginFetch)
            .and_then(|p| p.transition(SessionEvent::RepositoryLoaded))
            .and_then(|p| p.transition(SessionEvent::AnalysisComplete))
            .unwrap();
        assert_eq!(phase, SessionPhase::Completed);
    }

    #[test]
    fn test_fail_from_active_phases() {
        for phase in [SessionPhase::Pending, SessionPhase::Fetching, SessionPhase::Analyzing] {
            assert_eq!(phase.transition(SessionEvent::Fail).unwrap(), SessionPhase::Failed);
        }
    }

    #[test]
    fn test_terminal_phases_reject_everything() {
        for phase in [SessionPhase::Completed, SessionPhase::Failed] {
            assert!(phase.is_terminal());
            for event in ALL_EVENTS {
                let err = phase.transition(event).unwrap_err();
                assert!(matches!(err, AnalyzerError::InvalidTransition { .. }));
            }
        }
    }

    #[test]
    fn test_skipping_a_phase_is_rejected() {
        assert!(SessionPhase::Pending
            .transition(SessionEvent::AnalysisComplete)
            .is_err());
        assert!(SessionPhase::Fetching
            .transition(SessionEvent::BeginFetch)
            .is_err());
    }

    #[test]
    fn test_valid_events_match_transition_table() {
        for phase in ALL_PHASES {
            let valid = phase.valid_events();
            for event in ALL_EVENTS {
                assert_eq!(
                    phase.transition(event).is_ok(),
                    valid.contains(&event),
                    "{:?} on {:?}",
                    phase,
                    event
                );
            }
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(SessionPhase::Analyzing.to_string(), "analyzing");
    }
}
