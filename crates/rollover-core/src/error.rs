//! Error types for rolling replacement
//!
//! Two kinds of failure exist:
//! - Transient: a single collaborator call failing (`ClusterError`), absorbed
//!   by the retrying executor
//! - Fatal: an exhausted retry budget (`Timeout`) or an inconsistent
//!   snapshot, surfaced as `RolloverError` and never caught below the
//!   run controller

use crate::state_machine::ReplacementPhase;
use crate::types::{HealthCheckName, NodeId, Role, StepAction, ZoneId};
use std::fmt;

/// Failure of a single collaborator call
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// External command exited unsuccessfully
    #[error("command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// External command could not be spawned or read
    #[error("io error running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Output could not be interpreted
    #[error("invalid output from {operation}: {message}")]
    InvalidOutput { operation: String, message: String },

    /// Cluster reports a different node count than expected
    #[error("expected {expected} {role} nodes, cluster reports {actual}")]
    CountMismatch {
        role: Role,
        expected: usize,
        actual: usize,
    },

    /// Probe reported an unhealthy component
    #[error("health check {check} failed: {reason}")]
    Unhealthy {
        check: HealthCheckName,
        reason: String,
    },

    /// Collaborator not reachable
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    /// Create invalid output error
    pub fn invalid_output(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create io error for command
    pub fn io(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            command: command.into(),
            source,
        }
    }
}

/// Retry budget exhausted without a successful attempt
///
/// Deliberately distinct from the action's own error type so callers can
/// tell "gave up" from "failed once".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} did not succeed within {attempts} attempts{}", last_error_suffix(.last_error))]
pub struct Timeout {
    /// Label of the operation that was retried
    pub operation: String,
    /// Attempts made
    pub attempts: u32,
    /// Message of the final failed attempt (diagnostics only)
    pub last_error: Option<String>,
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {e})"))
        .unwrap_or_default()
}

/// A health check that did not pass within its retry budget
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("health check {check} failed: {source}")]
pub struct HealthGateError {
    /// The check that failed
    pub check: HealthCheckName,
    /// Exhausted retry budget
    #[source]
    pub source: Timeout,
}

impl HealthGateError {
    /// Attach the gating point, producing a fatal run error
    #[must_use]
    pub fn at(self, point: GatePoint) -> RolloverError {
        RolloverError::Step {
            step: RunStep::HealthGate {
                point,
                check: self.check,
            },
            source: self.source,
        }
    }
}

/// Where in the run a health gate was evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatePoint {
    /// Before any destructive action
    Preflight,
    /// After a master was replaced
    AfterMaster(NodeId),
    /// After an agent zone was replaced
    AfterZone(ZoneId),
}

impl fmt::Display for GatePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatePoint::Preflight => f.write_str("pre-flight"),
            GatePoint::AfterMaster(id) => write!(f, "after master {id}"),
            GatePoint::AfterZone(zone) => write!(f, "after zone {zone}"),
        }
    }
}

/// Inventory query issued while capturing a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryQuery {
    /// List masters
    Masters,
    /// Current leader
    Leader,
    /// List agents
    Agents,
}

impl fmt::Display for InventoryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryQuery::Masters => f.write_str("list masters"),
            InventoryQuery::Leader => f.write_str("current leader"),
            InventoryQuery::Agents => f.write_str("list agents"),
        }
    }
}

/// Step of the run that can fail fatally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStep {
    /// Optional pre-flight backup
    Backup,
    /// Snapshot query
    Inventory(InventoryQuery),
    /// Zone listing
    ListZones,
    /// Per-zone agent listing
    ListZoneAgents(ZoneId),
    /// Terminate, decommission or rejoin wait
    Replace(StepAction),
    /// One check of a health gate
    HealthGate {
        point: GatePoint,
        check: HealthCheckName,
    },
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStep::Backup => f.write_str("backup state"),
            RunStep::Inventory(query) => write!(f, "{query}"),
            RunStep::ListZones => f.write_str("list zones"),
            RunStep::ListZoneAgents(zone) => write!(f, "list agents in zone {zone}"),
            RunStep::Replace(action) => write!(f, "{action}"),
            RunStep::HealthGate { point, check } => {
                write!(f, "{point} health gate ({check})")
            }
        }
    }
}

/// Fatal run error
#[derive(Debug, thiserror::Error)]
pub enum RolloverError {
    /// A step exhausted its retry budget
    #[error("step '{step}' failed: {source}")]
    Step {
        step: RunStep,
        #[source]
        source: Timeout,
    },

    /// Snapshot violates leader membership
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Sequencer attempted an out-of-order phase change
    #[error("illegal replacement transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: ReplacementPhase,
        to: ReplacementPhase,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl RolloverError {
    /// Create step failure
    #[inline]
    pub fn step(step: RunStep, source: Timeout) -> Self {
        Self::Step { step, source }
    }

    /// The step that failed, if the error came from one
    #[inline]
    #[must_use]
    pub fn failed_step(&self) -> Option<&RunStep> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// The health check that failed, if the error came from a gate
    #[inline]
    #[must_use]
    pub fn failed_check(&self) -> Option<HealthCheckName> {
        match self.failed_step() {
            Some(RunStep::HealthGate { check, .. }) => Some(*check),
            _ => None,
        }
    }

    /// Check if error came from a retry budget running out
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Step { .. })
    }
}
