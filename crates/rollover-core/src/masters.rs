//! Master replacement sequencer
//!
//! Replaces control-plane nodes one at a time, leader last. Each master goes
//! through terminate, rejoin wait (back to the pre-run master count) and
//! the control-plane health gate before the next one is touched. The leader
//! is handled exactly like the others; any failure aborts the run.

use crate::cluster::ClusterOps;
use crate::config::RolloverConfig;
use crate::error::{GatePoint, RolloverError};
use crate::executor::RetryingExecutor;
use crate::health::HealthGate;
use crate::state_machine::{ReplacementCycle, ReplacementPhase};
use crate::types::{ClusterSnapshot, Node, NodeId, ReplacementStep, Role};
use std::sync::Arc;

/// Drives master replacement
#[derive(Clone)]
pub struct MasterSequencer {
    ops: Arc<dyn ClusterOps>,
    executor: RetryingExecutor,
    gate: HealthGate,
    terminate_budget: u32,
    rejoin_budget: u32,
}

impl MasterSequencer {
    /// Create sequencer
    pub fn new(
        ops: Arc<dyn ClusterOps>,
        executor: RetryingExecutor,
        gate: HealthGate,
        config: &RolloverConfig,
    ) -> Self {
        Self {
            ops,
            executor,
            gate,
            terminate_budget: config.terminate_budget(),
            rejoin_budget: config.rejoin_budget(),
        }
    }

    /// Followers in snapshot order, then the leader
    #[must_use]
    pub fn replacement_order(snapshot: &ClusterSnapshot) -> Vec<Node> {
        snapshot
            .followers()
            .chain(std::iter::once(snapshot.leader()))
            .cloned()
            .collect()
    }

    /// Replace every master in `snapshot`
    ///
    /// Returns the replaced master identifiers in replacement order.
    ///
    /// # Errors
    /// - `RolloverError::Step` for the first step whose budget ran out
    pub async fn run(&self, snapshot: &ClusterSnapshot) -> Result<Vec<NodeId>, RolloverError> {
        let expected = snapshot.master_count();
        let order = Self::replacement_order(snapshot);
        let mut cycle = ReplacementCycle::new();
        let mut replaced = Vec::with_capacity(order.len());

        tracing::info!(
            "Replacing {} masters, leader {} last",
            order.len(),
            snapshot.leader().id
        );

        for (index, node) in order.into_iter().enumerate() {
            let is_leader = node.id == snapshot.leader().id;
            tracing::info!(
                "Replacing master {}/{}: {}{}",
                index + 1,
                expected,
                node.id,
                if is_leader { " (leader)" } else { "" }
            );

            let id = self.replace_one(&mut cycle, node, expected).await?;
            replaced.push(id);
        }

        Ok(replaced)
    }

    async fn replace_one(
        &self,
        cycle: &mut ReplacementCycle,
        node: Node,
        expected: usize,
    ) -> Result<NodeId, RolloverError> {
        let id = node.id.clone();
        let ops = self.ops.as_ref();

        cycle.advance(ReplacementPhase::Replacing)?;
        self.executor
            .run_step(ops, ReplacementStep::terminate(node, self.terminate_budget))
            .await?;

        cycle.advance(ReplacementPhase::WaitingForRejoin)?;
        self.executor
            .run_step(
                ops,
                ReplacementStep::wait_for_rejoin(Role::Master, expected, self.rejoin_budget),
            )
            .await?;

        cycle.advance(ReplacementPhase::HealthChecking)?;
        self.gate
            .control_plane()
            .await
            .map_err(|e| e.at(GatePoint::AfterMaster(id.clone())))?;

        cycle.advance(ReplacementPhase::Done)?;
        tracing::info!("Master {} replaced", id);
        Ok(id)
    }
}

impl std::fmt::Debug for MasterSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSequencer")
            .field("terminate_budget", &self.terminate_budget)
            .field("rejoin_budget", &self.rejoin_budget)
            .finish_non_exhaustive()
    }
}
