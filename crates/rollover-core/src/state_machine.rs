//! Replacement phase state machine
//!
//! Every sequencer cycle (one master, or one agent zone) walks
//! `Replacing -> WaitingForRejoin -> HealthChecking -> Done`. A new cycle may
//! only start from `Pending` or `Done`, so two destructive cycles can never
//! run back to back without the health check in between.

use crate::error::RolloverError;
use serde::Serialize;

/// Phase of a sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementPhase {
    /// No cycle started yet
    Pending,
    /// Destructive actions in flight
    Replacing,
    /// Waiting for replacements to rejoin
    WaitingForRejoin,
    /// Running the health gate
    HealthChecking,
    /// Cycle completed and verified
    Done,
}

impl ReplacementPhase {
    /// Every phase
    pub const ALL: [ReplacementPhase; 5] = [
        ReplacementPhase::Pending,
        ReplacementPhase::Replacing,
        ReplacementPhase::WaitingForRejoin,
        ReplacementPhase::HealthChecking,
        ReplacementPhase::Done,
    ];
}

/// Validates a phase transition.
pub fn validate_transition(
    from: ReplacementPhase,
    to: ReplacementPhase,
) -> Result<(), RolloverError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(RolloverError::IllegalTransition { from, to })
    }
}

pub fn allowed_transitions(from: ReplacementPhase) -> Vec<ReplacementPhase> {
    use ReplacementPhase::*;
    match from {
        Pending => vec![Replacing],
        Replacing => vec![WaitingForRejoin],
        WaitingForRejoin => vec![HealthChecking],
        HealthChecking => vec![Done],
        Done => vec![Replacing],
    }
}

/// Tracks the phase of one sequencer
#[derive(Debug, Clone)]
pub struct ReplacementCycle {
    phase: ReplacementPhase,
    completed: usize,
}

impl ReplacementCycle {
    /// Start in `Pending`
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ReplacementPhase::Pending,
            completed: 0,
        }
    }

    /// Move to `to`, rejecting out-of-order transitions
    pub fn advance(&mut self, to: ReplacementPhase) -> Result<(), RolloverError> {
        validate_transition(self.phase, to)?;
        tracing::debug!("Replacement phase {:?} -> {:?}", self.phase, to);
        if to == ReplacementPhase::Done {
            self.completed += 1;
        }
        self.phase = to;
        Ok(())
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> ReplacementPhase {
        self.phase
    }

    /// Number of cycles that reached `Done`
    #[inline]
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Whether a new destructive cycle may begin
    #[inline]
    #[must_use]
    pub fn can_replace(&self) -> bool {
        matches!(self.phase, ReplacementPhase::Pending | ReplacementPhase::Done)
    }
}

impl Default for ReplacementCycle {
    fn default() -> Self {
        Self::new()
    }
}
