//! Run summary and outcome

use crate::agents::ZoneReport;
use crate::error::{RolloverError, RunStep};
use crate::types::{ClusterSnapshot, Node, NodeId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Cluster identifier/context
    pub cluster: String,
    /// Membership before any replacement
    pub before: ClusterSnapshot,
    /// Membership after the last zone
    pub after: ClusterSnapshot,
    /// Masters replaced, leader last
    pub replaced_masters: Vec<NodeId>,
    /// Per-zone agent replacement
    pub zones: Vec<ZoneReport>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Total agents replaced across zones
    #[must_use]
    pub fn agents_replaced(&self) -> usize {
        self.zones.iter().map(|z| z.replaced.len()).sum()
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render as human-readable text
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        let elapsed = self.finished_at - self.started_at;

        let _ = writeln!(out, "Rolling Replacement Report");
        let _ = writeln!(out, "==========================");
        let _ = writeln!(out, "Cluster: {}", self.cluster);
        let _ = writeln!(out, "Duration: {}s", elapsed.num_seconds());
        let _ = writeln!(out);
        write_snapshot(&mut out, "Before", &self.before);
        let _ = writeln!(out);
        write_snapshot(&mut out, "After", &self.after);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Masters replaced ({}): {}",
            self.replaced_masters.len(),
            join_ids(self.replaced_masters.iter())
        );
        let _ = writeln!(out, "Agents replaced: {}", self.agents_replaced());
        for zone in &self.zones {
            let _ = writeln!(
                out,
                "  {} ({}): {}",
                zone.zone,
                zone.replaced.len(),
                join_ids(zone.replaced.iter())
            );
        }

        out
    }
}

fn write_snapshot(out: &mut String, title: &str, snapshot: &ClusterSnapshot) {
    let _ = writeln!(out, "{title}:");
    let _ = writeln!(
        out,
        "  Masters ({}): {}",
        snapshot.master_count(),
        join_nodes(snapshot.masters())
    );
    let _ = writeln!(out, "  Leader: {}", snapshot.leader().id);
    let _ = writeln!(
        out,
        "  Agents ({}): {}",
        snapshot.agent_count(),
        join_nodes(snapshot.agents())
    );
}

fn join_nodes(nodes: &[Node]) -> String {
    join_ids(nodes.iter().map(|n| &n.id))
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a NodeId>) -> String {
    let joined = ids.map(NodeId::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

/// Outcome of a whole run
#[derive(Debug)]
pub enum RunResult {
    /// Every step completed
    Succeeded(Box<RunReport>),
    /// First fatal error; nothing after it ran
    Failed(RolloverError),
}

impl RunResult {
    /// Process exit status
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded(_) => 0,
            Self::Failed(_) => 1,
        }
    }

    /// Whether the run completed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// The failing step, if any
    #[inline]
    #[must_use]
    pub fn failed_step(&self) -> Option<&RunStep> {
        match self {
            Self::Failed(e) => e.failed_step(),
            Self::Succeeded(_) => None,
        }
    }
}

impl From<Result<RunReport, RolloverError>> for RunResult {
    fn from(value: Result<RunReport, RolloverError>) -> Self {
        match value {
            Ok(report) => Self::Succeeded(Box::new(report)),
            Err(e) => Self::Failed(e),
        }
    }
}
