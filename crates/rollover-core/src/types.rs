//! Core types for rolling replacement
//!
//! Defines the fundamental values threaded through a run:
//! - Nodes, roles and zones
//! - Point-in-time cluster snapshots
//! - Health check names and the fixed gate sets
//! - Replacement steps handed to the retrying executor

use crate::error::RolloverError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host or instance reference as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create node identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Availability-zone name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    /// Create zone identifier
    #[inline]
    #[must_use]
    pub fn new(zone: impl Into<String>) -> Self {
        Self(zone.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node role within the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Control-plane node
    Master,
    /// Worker node
    Agent,
}

impl Role {
    /// Lowercase name used in logs and command templates
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster node
///
/// Ephemeral: produced fresh by every inventory query and superseded,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Host/instance reference
    pub id: NodeId,
    /// Role in the cluster
    pub role: Role,
    /// Availability zone (agents only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<ZoneId>,
}

impl Node {
    /// Create master node
    #[inline]
    #[must_use]
    pub fn master(id: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            role: Role::Master,
            zone: None,
        }
    }

    /// Create agent node without a known zone
    #[inline]
    #[must_use]
    pub fn agent(id: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            role: Role::Agent,
            zone: None,
        }
    }

    /// Attach zone
    #[inline]
    #[must_use]
    pub fn in_zone(mut self, zone: ZoneId) -> Self {
        self.zone = Some(zone);
        self
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.zone {
            Some(zone) => write!(f, "{} {} ({})", self.role, self.id, zone),
            None => write!(f, "{} {}", self.role, self.id),
        }
    }
}

/// Point-in-time view of cluster membership
///
/// Captured before and after a run. The leader is always one of the masters;
/// construction rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSnapshot {
    masters: Vec<Node>,
    leader: Node,
    agents: Vec<Node>,
    captured_at: DateTime<Utc>,
}

impl ClusterSnapshot {
    /// Assemble snapshot from inventory query results
    ///
    /// # Errors
    /// - `RolloverError::InvalidSnapshot` if the leader is not a master
    pub fn new(masters: Vec<Node>, leader: Node, agents: Vec<Node>) -> Result<Self, RolloverError> {
        if !masters.iter().any(|m| m.id == leader.id) {
            return Err(RolloverError::InvalidSnapshot(format!(
                "leader {} is not among the {} reported masters",
                leader.id,
                masters.len()
            )));
        }

        Ok(Self {
            masters,
            leader,
            agents,
            captured_at: Utc::now(),
        })
    }

    /// Masters in the order the cluster reported them
    #[inline]
    #[must_use]
    pub fn masters(&self) -> &[Node] {
        &self.masters
    }

    /// Current leader
    #[inline]
    #[must_use]
    pub fn leader(&self) -> &Node {
        &self.leader
    }

    /// Agents in the order the cluster reported them
    #[inline]
    #[must_use]
    pub fn agents(&self) -> &[Node] {
        &self.agents
    }

    /// Number of masters
    #[inline]
    #[must_use]
    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    /// Number of agents
    #[inline]
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Capture time
    #[inline]
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Masters other than the leader, in snapshot order
    pub fn followers(&self) -> impl Iterator<Item = &Node> {
        self.masters.iter().filter(move |m| m.id != self.leader.id)
    }
}

/// Health checks the cluster exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthCheckName {
    /// Consensus store (replicated key/value log) is healthy
    ConsensusStore,
    /// A leader is elected and reachable
    LeaderElection,
    /// Control-plane state snapshot is fresh
    ControlPlaneSnapshot,
    /// Coordination service ensemble is healthy
    CoordinationService,
    /// Agent state snapshot is fresh
    AgentSnapshot,
}

impl HealthCheckName {
    /// Gate run before the first replacement and after every master cycle
    pub const CONTROL_PLANE_GATE: [HealthCheckName; 4] = [
        HealthCheckName::ConsensusStore,
        HealthCheckName::LeaderElection,
        HealthCheckName::ControlPlaneSnapshot,
        HealthCheckName::CoordinationService,
    ];

    /// Gate run after every agent zone
    pub const AGENT_GATE: [HealthCheckName; 1] = [HealthCheckName::AgentSnapshot];

    /// Every known check
    pub const ALL: [HealthCheckName; 5] = [
        HealthCheckName::ConsensusStore,
        HealthCheckName::LeaderElection,
        HealthCheckName::ControlPlaneSnapshot,
        HealthCheckName::CoordinationService,
        HealthCheckName::AgentSnapshot,
    ];

    /// Kebab-case name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheckName::ConsensusStore => "consensus-store",
            HealthCheckName::LeaderElection => "leader-election",
            HealthCheckName::ControlPlaneSnapshot => "control-plane-snapshot",
            HealthCheckName::CoordinationService => "coordination-service",
            HealthCheckName::AgentSnapshot => "agent-snapshot",
        }
    }
}

impl fmt::Display for HealthCheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthCheckName {
    type Err = RolloverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|check| check.as_str() == s)
            .ok_or_else(|| RolloverError::Config(format!("unknown health check: '{s}'")))
    }
}

/// What a replacement step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Terminate the node's instance
    Terminate(Node),
    /// Remove the node from the cluster membership view
    Decommission(Node),
    /// Poll until the cluster reports the expected node count for a role
    WaitForRejoin {
        /// Role to count
        role: Role,
        /// Count to wait for
        expected: usize,
    },
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::Terminate(node) => write!(f, "terminate {}", node.id),
            StepAction::Decommission(node) => write!(f, "decommission {}", node.id),
            StepAction::WaitForRejoin { role, expected } => {
                write!(f, "wait for {expected} {role} nodes")
            }
        }
    }
}

/// Unit of work created by a sequencer and consumed by the executor
///
/// Never persisted; discarded once the executor returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementStep {
    /// Action to perform
    pub action: StepAction,
    /// Attempt budget for the executor
    pub budget: u32,
}

impl ReplacementStep {
    /// Terminate step
    #[inline]
    #[must_use]
    pub fn terminate(node: Node, budget: u32) -> Self {
        Self {
            action: StepAction::Terminate(node),
            budget,
        }
    }

    /// Decommission step
    #[inline]
    #[must_use]
    pub fn decommission(node: Node, budget: u32) -> Self {
        Self {
            action: StepAction::Decommission(node),
            budget,
        }
    }

    /// Rejoin-wait step
    #[inline]
    #[must_use]
    pub fn wait_for_rejoin(role: Role, expected: usize, budget: u32) -> Self {
        Self {
            action: StepAction::WaitForRejoin { role, expected },
            budget,
        }
    }

    /// Whether the step removes capacity from the cluster
    #[inline]
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(
            self.action,
            StepAction::Terminate(_) | StepAction::Decommission(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masters() -> Vec<Node> {
        vec![Node::master("A"), Node::master("B"), Node::master("C")]
    }

    #[test]
    fn snapshot_rejects_leader_outside_masters() {
        let result = ClusterSnapshot::new(masters(), Node::master("Z"), vec![]);
        assert!(matches!(result, Err(RolloverError::InvalidSnapshot(_))));
    }

    #[test]
    fn snapshot_followers_skip_leader_in_order() {
        let snapshot = ClusterSnapshot::new(masters(), Node::master("B"), vec![]).unwrap();
        let followers: Vec<_> = snapshot.followers().map(|n| n.id.as_str()).collect();
        assert_eq!(followers, vec!["A", "C"]);
        assert_eq!(snapshot.master_count(), 3);
        assert_eq!(snapshot.agent_count(), 0);
    }

    #[test]
    fn health_check_names_round_trip_through_str() {
        for check in HealthCheckName::ALL {
            assert_eq!(check.as_str().parse::<HealthCheckName>().unwrap(), check);
        }
        assert!("quorum".parse::<HealthCheckName>().is_err());
    }

    #[test]
    fn control_plane_gate_order_is_fixed() {
        let names: Vec<_> = HealthCheckName::CONTROL_PLANE_GATE
            .iter()
            .map(HealthCheckName::as_str)
            .collect();
        assert_eq!(
            names,
            vec![
                "consensus-store",
                "leader-election",
                "control-plane-snapshot",
                "coordination-service"
            ]
        );
    }

    #[test]
    fn only_terminate_and_decommission_are_destructive() {
        assert!(ReplacementStep::terminate(Node::master("A"), 1).is_destructive());
        assert!(ReplacementStep::decommission(Node::agent("a1"), 1).is_destructive());
        assert!(!ReplacementStep::wait_for_rejoin(Role::Agent, 4, 1).is_destructive());
    }

    #[test]
    fn node_display_includes_zone() {
        let node = Node::agent("a1").in_zone(ZoneId::new("z1"));
        assert_eq!(node.to_string(), "agent a1 (z1)");
    }
}
