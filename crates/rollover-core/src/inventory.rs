//! Inventory snapshots
//!
//! Captures masters, leader and agents through the retrying executor. The
//! three queries are independent; the snapshot is only as consistent as the
//! cluster's answers, which is enough for a baseline and target counts.

use crate::cluster::ClusterOps;
use crate::error::{InventoryQuery, RolloverError, RunStep};
use crate::executor::RetryingExecutor;
use crate::types::ClusterSnapshot;
use std::sync::Arc;

/// Snapshot capturer
#[derive(Clone)]
pub struct Inventory {
    ops: Arc<dyn ClusterOps>,
    executor: RetryingExecutor,
    budget: u32,
}

impl Inventory {
    /// Create capturer; each query gets `budget` attempts
    pub fn new(ops: Arc<dyn ClusterOps>, executor: RetryingExecutor, budget: u32) -> Self {
        Self {
            ops,
            executor,
            budget,
        }
    }

    /// Capture the current cluster membership
    ///
    /// # Errors
    /// - `RolloverError::Step` if a query exhausts its budget
    /// - `RolloverError::InvalidSnapshot` if the leader is not a master
    pub async fn capture(&self) -> Result<ClusterSnapshot, RolloverError> {
        let ops = self.ops.as_ref();

        let masters = self
            .executor
            .execute("list masters", self.budget, move || ops.list_masters())
            .await
            .map_err(|e| RolloverError::step(RunStep::Inventory(InventoryQuery::Masters), e))?;

        let leader = self
            .executor
            .execute("current leader", self.budget, move || ops.current_leader())
            .await
            .map_err(|e| RolloverError::step(RunStep::Inventory(InventoryQuery::Leader), e))?;

        let agents = self
            .executor
            .execute("list agents", self.budget, move || ops.list_agents())
            .await
            .map_err(|e| RolloverError::step(RunStep::Inventory(InventoryQuery::Agents), e))?;

        let snapshot = ClusterSnapshot::new(masters, leader, agents)?;
        tracing::debug!(
            "Captured snapshot: {} masters (leader {}), {} agents",
            snapshot.master_count(),
            snapshot.leader().id,
            snapshot.agent_count()
        );

        Ok(snapshot)
    }
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory")
            .field("executor", &self.executor)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterOps;
    use crate::error::ClusterError;
    use crate::types::Node;
    use std::time::Duration;

    fn inventory(ops: MockClusterOps) -> Inventory {
        Inventory::new(
            Arc::new(ops),
            RetryingExecutor::new(Duration::from_millis(1)),
            2,
        )
    }

    #[tokio::test]
    async fn capture_assembles_snapshot() {
        let mut ops = MockClusterOps::new();
        ops.expect_list_masters()
            .returning(|| Ok(vec![Node::master("A"), Node::master("B")]));
        ops.expect_current_leader().returning(|| Ok(Node::master("B")));
        ops.expect_list_agents()
            .returning(|| Ok(vec![Node::agent("a1")]));

        let snapshot = inventory(ops).capture().await.unwrap();
        assert_eq!(snapshot.master_count(), 2);
        assert_eq!(snapshot.leader().id.as_str(), "B");
        assert_eq!(snapshot.agent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_leader_query_names_the_query() {
        let mut ops = MockClusterOps::new();
        ops.expect_list_masters()
            .returning(|| Ok(vec![Node::master("A")]));
        ops.expect_current_leader()
            .times(2)
            .returning(|| Err(ClusterError::Unavailable("no leader".to_string())));
        ops.expect_list_agents().never();

        let err = inventory(ops).capture().await.unwrap_err();
        assert_eq!(
            err.failed_step(),
            Some(&RunStep::Inventory(InventoryQuery::Leader))
        );
    }

    #[tokio::test]
    async fn leader_outside_masters_is_invalid() {
        let mut ops = MockClusterOps::new();
        ops.expect_list_masters()
            .returning(|| Ok(vec![Node::master("A")]));
        ops.expect_current_leader().returning(|| Ok(Node::master("X")));
        ops.expect_list_agents().returning(|| Ok(vec![]));

        let err = inventory(ops).capture().await.unwrap_err();
        assert!(matches!(err, RolloverError::InvalidSnapshot(_)));
    }
}
