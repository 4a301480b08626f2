//! Run controller
//!
//! Composes the full run:
//! 1. Optional state backup
//! 2. Pre-flight control-plane gate
//! 3. Before-snapshot
//! 4. Master replacement (leader last)
//! 5. Agent replacement (zone by zone)
//! 6. After-snapshot and report
//!
//! The first fatal error ends the run. Nothing is rolled back; the cluster's
//! own recovery is expected to have replaced any terminated node, and the
//! run can be repeated once the cause is understood.

use crate::agents::AgentSequencer;
use crate::cluster::ClusterOps;
use crate::config::RolloverConfig;
use crate::error::{GatePoint, RolloverError, RunStep};
use crate::executor::RetryingExecutor;
use crate::health::HealthGate;
use crate::inventory::Inventory;
use crate::masters::MasterSequencer;
use crate::report::{RunReport, RunResult};
use chrono::Utc;
use std::sync::Arc;

/// Top-level driver of a rolling replacement
pub struct RolloverController {
    cluster: String,
    config: RolloverConfig,
    ops: Arc<dyn ClusterOps>,
    executor: RetryingExecutor,
    gate: HealthGate,
    inventory: Inventory,
    masters: MasterSequencer,
    agents: AgentSequencer,
}

impl RolloverController {
    /// Create controller for `cluster`
    pub fn new(cluster: impl Into<String>, ops: Arc<dyn ClusterOps>, config: RolloverConfig) -> Self {
        let executor = RetryingExecutor::from_config(&config.retry);
        let gate = HealthGate::new(Arc::clone(&ops), executor, config.health_budget());
        let inventory = Inventory::new(Arc::clone(&ops), executor, config.inventory_budget());
        let masters = MasterSequencer::new(Arc::clone(&ops), executor, gate.clone(), &config);
        let agents = AgentSequencer::new(Arc::clone(&ops), executor, gate.clone(), &config);

        Self {
            cluster: cluster.into(),
            config,
            ops,
            executor,
            gate,
            inventory,
            masters,
            agents,
        }
    }

    /// Run to completion or first fatal error
    pub async fn run(&self) -> RunResult {
        let result = self.execute().await;
        match &result {
            Ok(report) => tracing::info!(
                "Rolling replacement of {} completed: {} masters, {} agents replaced",
                self.cluster,
                report.replaced_masters.len(),
                report.agents_replaced()
            ),
            Err(e) => tracing::error!("Rolling replacement of {} failed: {}", self.cluster, e),
        }
        RunResult::from(result)
    }

    /// Run and return the report, propagating the first fatal error
    ///
    /// # Errors
    /// - `RolloverError` naming the failing step
    pub async fn execute(&self) -> Result<RunReport, RolloverError> {
        let started_at = Utc::now();
        tracing::info!("Starting rolling replacement of {}", self.cluster);

        if self.config.backup_before_run {
            self.backup().await?;
        }

        self.gate
            .control_plane()
            .await
            .map_err(|e| e.at(GatePoint::Preflight))?;

        let before = self.inventory.capture().await?;
        tracing::info!(
            "Before: {} masters (leader {}), {} agents",
            before.master_count(),
            before.leader().id,
            before.agent_count()
        );

        let replaced_masters = self.masters.run(&before).await?;
        let zones = self.agents.run(before.agent_count()).await?;

        let after = self.inventory.capture().await?;
        tracing::info!(
            "After: {} masters (leader {}), {} agents",
            after.master_count(),
            after.leader().id,
            after.agent_count()
        );

        Ok(RunReport {
            cluster: self.cluster.clone(),
            before,
            after,
            replaced_masters,
            zones,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn backup(&self) -> Result<(), RolloverError> {
        let ops = self.ops.as_ref();
        self.executor
            .execute("backup state", self.config.retry.budget, move || {
                ops.backup_state()
            })
            .await
            .map_err(|e| RolloverError::step(RunStep::Backup, e))?;
        tracing::info!("Cluster state backed up");
        Ok(())
    }

    /// Cluster identifier
    #[inline]
    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RolloverConfig {
        &self.config
    }
}

impl std::fmt::Debug for RolloverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloverController")
            .field("cluster", &self.cluster)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterOps;
    use crate::error::ClusterError;
    use crate::types::HealthCheckName;
    use std::time::Duration;

    fn config() -> RolloverConfig {
        RolloverConfig::new()
            .with_retry_budget(3)
            .with_backoff_unit(Duration::from_millis(5))
    }

    #[tokio::test(start_paused = true)]
    async fn failed_backup_stops_before_preflight() {
        let mut ops = MockClusterOps::new();
        ops.expect_backup_state()
            .times(3)
            .returning(|| Err(ClusterError::Unavailable("snapshot store".to_string())));
        ops.expect_check_health().never();
        ops.expect_terminate_instance().never();

        let controller = RolloverController::new("prod", Arc::new(ops), config().with_backup(true));
        let result = controller.run().await;

        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.failed_step(), Some(&RunStep::Backup));
    }

    #[tokio::test(start_paused = true)]
    async fn preflight_failure_never_captures_inventory() {
        let mut ops = MockClusterOps::new();
        ops.expect_check_health()
            .returning(|check| {
                Err(ClusterError::Unhealthy {
                    check,
                    reason: "quorum lost".to_string(),
                })
            });
        ops.expect_list_masters().never();
        ops.expect_terminate_instance().never();
        ops.expect_backup_state().never();

        let controller = RolloverController::new("prod", Arc::new(ops), config());
        let err = controller.execute().await.unwrap_err();

        assert_eq!(err.failed_check(), Some(HealthCheckName::ConsensusStore));
        assert!(err.to_string().contains("pre-flight"));
    }
}
