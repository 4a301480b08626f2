//! Testing utilities for the rollover workspace
//!
//! `ScriptedCluster` is an in-memory cluster that records every collaborator
//! call in order and can be told to fail specific calls, either a fixed
//! number of times (transient) or forever (fatal).

#![allow(missing_docs)]

use parking_lot::Mutex;
use rollover_core::{ClusterError, ClusterOps, HealthCheckName, Node, Role, ZoneId};
use std::collections::HashMap;
use std::fmt;

/// A recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    Backup,
    ListMasters,
    CurrentLeader,
    ListAgents,
    ListZones,
    ListAgentsInZone(String),
    Health(HealthCheckName),
    Terminate(String),
    Decommission(String),
    WaitForCount(Role, usize),
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::Backup => f.write_str("backup"),
            Call::ListMasters => f.write_str("list-masters"),
            Call::CurrentLeader => f.write_str("current-leader"),
            Call::ListAgents => f.write_str("list-agents"),
            Call::ListZones => f.write_str("list-zones"),
            Call::ListAgentsInZone(zone) => write!(f, "list-agents-in-zone({zone})"),
            Call::Health(check) => write!(f, "health({check})"),
            Call::Terminate(id) => write!(f, "terminate({id})"),
            Call::Decommission(id) => write!(f, "decommission({id})"),
            Call::WaitForCount(role, n) => write!(f, "wait({role},{n})"),
        }
    }
}

/// How often a scripted call fails before succeeding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Fail the next `n` invocations, then succeed
    Times(u32),
    /// Fail every invocation
    Always,
    /// Succeed the first `n` invocations, then fail every one after
    After(u32),
}

#[derive(Debug, Default)]
struct State {
    masters: Vec<Node>,
    leader: Option<Node>,
    zones: Vec<(ZoneId, Vec<Node>)>,
    failures: HashMap<Call, Failure>,
    calls: Vec<Call>,
}

/// Scripted in-memory cluster
///
/// Terminated nodes are assumed to be replaced instantly by the cloud layer,
/// so counts always match the scripted topology unless a failure is scripted.
#[derive(Debug, Default)]
pub struct ScriptedCluster {
    state: Mutex<State>,
}

impl ScriptedCluster {
    /// Create cluster with masters, leader and zoned agents
    pub fn new(masters: &[&str], leader: &str, zones: &[(&str, &[&str])]) -> Self {
        let state = State {
            masters: masters.iter().map(|m| Node::master(*m)).collect(),
            leader: Some(Node::master(leader)),
            zones: zones
                .iter()
                .map(|(zone, agents)| {
                    let zone = ZoneId::new(*zone);
                    let nodes = agents
                        .iter()
                        .map(|a| Node::agent(*a).in_zone(zone.clone()))
                        .collect();
                    (zone, nodes)
                })
                .collect(),
            ..State::default()
        };

        Self {
            state: Mutex::new(state),
        }
    }

    /// The three-master, two-zone reference topology
    pub fn reference() -> Self {
        Self::new(
            &["A", "B", "C"],
            "B",
            &[("z1", &["a1", "a2"]), ("z2", &["a3", "a4"])],
        )
    }

    /// Script a failure for `call`
    pub fn fail(self, call: Call, failure: Failure) -> Self {
        self.state.lock().failures.insert(call, failure);
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Calls rendered as strings, in order
    pub fn call_log(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    /// Index of the first occurrence of `call`
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.state.lock().calls.iter().position(|c| c == call)
    }

    /// Number of times `call` was made
    pub fn count(&self, call: &Call) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());

        match state.failures.get_mut(&call) {
            Some(Failure::Always) => {
                Err(ClusterError::Unavailable(format!("{call} scripted to fail")))
            }
            Some(Failure::Times(n)) if *n > 0 => {
                *n -= 1;
                Err(ClusterError::Unavailable(format!("{call} transiently failing")))
            }
            Some(Failure::After(n)) => {
                if *n == 0 {
                    Err(ClusterError::Unavailable(format!("{call} stopped responding")))
                } else {
                    *n -= 1;
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    fn agents(&self) -> Vec<Node> {
        self.state
            .lock()
            .zones
            .iter()
            .flat_map(|(_, nodes)| nodes.iter().cloned())
            .collect()
    }
}

#[async_trait::async_trait]
impl ClusterOps for ScriptedCluster {
    async fn list_masters(&self) -> Result<Vec<Node>, ClusterError> {
        self.record(Call::ListMasters)?;
        Ok(self.state.lock().masters.clone())
    }

    async fn current_leader(&self) -> Result<Node, ClusterError> {
        self.record(Call::CurrentLeader)?;
        self.state
            .lock()
            .leader
            .clone()
            .ok_or_else(|| ClusterError::Unavailable("no leader".to_string()))
    }

    async fn list_agents(&self) -> Result<Vec<Node>, ClusterError> {
        self.record(Call::ListAgents)?;
        Ok(self.agents())
    }

    async fn list_zones(&self) -> Result<Vec<ZoneId>, ClusterError> {
        self.record(Call::ListZones)?;
        Ok(self.state.lock().zones.iter().map(|(z, _)| z.clone()).collect())
    }

    async fn list_agents_in_zone(&self, zone: &ZoneId) -> Result<Vec<Node>, ClusterError> {
        self.record(Call::ListAgentsInZone(zone.to_string()))?;
        Ok(self
            .state
            .lock()
            .zones
            .iter()
            .find(|(z, _)| z == zone)
            .map(|(_, nodes)| nodes.clone())
            .unwrap_or_default())
    }

    async fn check_health(&self, check: HealthCheckName) -> Result<(), ClusterError> {
        self.record(Call::Health(check))
    }

    async fn terminate_instance(&self, node: &Node) -> Result<(), ClusterError> {
        self.record(Call::Terminate(node.id.to_string()))
    }

    async fn decommission_agent(&self, node: &Node) -> Result<(), ClusterError> {
        self.record(Call::Decommission(node.id.to_string()))
    }

    async fn wait_for_count(&self, role: Role, expected: usize) -> Result<(), ClusterError> {
        self.record(Call::WaitForCount(role, expected))?;
        let actual = match role {
            Role::Master => self.state.lock().masters.len(),
            Role::Agent => self.agents().len(),
        };
        if actual == expected {
            Ok(())
        } else {
            Err(ClusterError::CountMismatch {
                role,
                expected,
                actual,
            })
        }
    }

    async fn backup_state(&self) -> Result<(), ClusterError> {
        self.record(Call::Backup)
    }
}
