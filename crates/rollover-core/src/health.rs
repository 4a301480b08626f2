//! Health gate
//!
//! Runs an ordered list of health probes through the retrying executor and
//! stops at the first one that exhausts its budget.

use crate::cluster::ClusterOps;
use crate::error::HealthGateError;
use crate::executor::RetryingExecutor;
use crate::types::HealthCheckName;
use std::sync::Arc;

/// Checks confirmed by a passing gate, in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Checks that passed
    pub passed: Vec<HealthCheckName>,
}

/// Health gate over a cluster
#[derive(Clone)]
pub struct HealthGate {
    ops: Arc<dyn ClusterOps>,
    executor: RetryingExecutor,
    budget: u32,
}

impl HealthGate {
    /// Create gate; every probe gets `budget` attempts
    pub fn new(ops: Arc<dyn ClusterOps>, executor: RetryingExecutor, budget: u32) -> Self {
        Self {
            ops,
            executor,
            budget,
        }
    }

    /// Run `checks` in order, failing fast
    ///
    /// # Errors
    /// - `HealthGateError` naming the first check whose budget ran out
    pub async fn check_all(
        &self,
        checks: &[HealthCheckName],
    ) -> Result<GateReport, HealthGateError> {
        for &check in checks {
            let label = format!("health check {check}");
            let ops = self.ops.as_ref();
            self.executor
                .execute(&label, self.budget, move || ops.check_health(check))
                .await
                .map_err(|source| HealthGateError { check, source })?;
        }

        for check in checks {
            tracing::info!("Health check passed: {}", check);
        }

        Ok(GateReport {
            passed: checks.to_vec(),
        })
    }

    /// Control-plane gate: consensus store, leader, control-plane snapshot,
    /// coordination service
    pub async fn control_plane(&self) -> Result<GateReport, HealthGateError> {
        self.check_all(&HealthCheckName::CONTROL_PLANE_GATE).await
    }

    /// Agent gate: agent snapshot freshness
    pub async fn agents(&self) -> Result<GateReport, HealthGateError> {
        self.check_all(&HealthCheckName::AGENT_GATE).await
    }
}

impl std::fmt::Debug for HealthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthGate")
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
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::time::Duration;

    fn gate(ops: MockClusterOps, budget: u32) -> HealthGate {
        HealthGate::new(
            Arc::new(ops),
            RetryingExecutor::new(Duration::from_millis(10)),
            budget,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn control_plane_runs_checks_in_order() {
        let mut ops = MockClusterOps::new();
        let mut seq = Sequence::new();
        for check in HealthCheckName::CONTROL_PLANE_GATE {
            ops.expect_check_health()
                .with(eq(check))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let report = gate(ops, 3).control_plane().await.unwrap();
        assert_eq!(report.passed, HealthCheckName::CONTROL_PLANE_GATE.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn first_failing_check_stops_the_gate() {
        let mut ops = MockClusterOps::new();
        ops.expect_check_health()
            .with(eq(HealthCheckName::ConsensusStore))
            .returning(|_| Ok(()));
        ops.expect_check_health()
            .with(eq(HealthCheckName::LeaderElection))
            .times(3)
            .returning(|check| {
                Err(ClusterError::Unhealthy {
                    check,
                    reason: "no leader".to_string(),
                })
            });
        // Later checks must never run.
        ops.expect_check_health()
            .with(eq(HealthCheckName::ControlPlaneSnapshot))
            .never();
        ops.expect_check_health()
            .with(eq(HealthCheckName::CoordinationService))
            .never();

        let err = gate(ops, 3).control_plane().await.unwrap_err();
        assert_eq!(err.check, HealthCheckName::LeaderElection);
        assert_eq!(err.source.attempts, 3);
        assert!(err.source.last_error.unwrap().contains("no leader"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_probe_failure_is_absorbed() {
        let mut ops = MockClusterOps::new();
        let mut seq = Sequence::new();
        ops.expect_check_health()
            .with(eq(HealthCheckName::AgentSnapshot))
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(ClusterError::Unavailable("stale".to_string())));
        ops.expect_check_health()
            .with(eq(HealthCheckName::AgentSnapshot))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let report = gate(ops, 5).agents().await.unwrap();
        assert_eq!(report.passed, vec![HealthCheckName::AgentSnapshot]);
    }

    #[tokio::test]
    async fn empty_gate_passes_trivially() {
        let report = gate(MockClusterOps::new(), 1).check_all(&[]).await.unwrap();
        assert!(report.passed.is_empty());
    }
}
