//! Agent replacement sequencer
//!
//! Zones are processed strictly one after another, bounding capacity loss to
//! a single zone. Zone membership is re-queried when the zone's turn comes,
//! since earlier zones may already have shifted agents around.

use crate::cluster::ClusterOps;
use crate::config::RolloverConfig;
use crate::error::{GatePoint, RolloverError, RunStep};
use crate::executor::RetryingExecutor;
use crate::health::HealthGate;
use crate::state_machine::{ReplacementCycle, ReplacementPhase};
use crate::types::{NodeId, ReplacementStep, Role, ZoneId};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneReport {
    /// Zone processed
    pub zone: ZoneId,
    /// Agents terminated and decommissioned, in order
    pub replaced: Vec<NodeId>,
}

/// Drives agent replacement zone by zone
#[derive(Clone)]
pub struct AgentSequencer {
    ops: Arc<dyn ClusterOps>,
    executor: RetryingExecutor,
    gate: HealthGate,
    query_budget: u32,
    terminate_budget: u32,
    decommission_budget: u32,
    rejoin_budget: u32,
}

impl AgentSequencer {
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
            query_budget: config.inventory_budget(),
            terminate_budget: config.terminate_budget(),
            decommission_budget: config.decommission_budget(),
            rejoin_budget: config.rejoin_budget(),
        }
    }

    /// Replace every agent, zone by zone, restoring `expected_agents` after each
    ///
    /// # Errors
    /// - `RolloverError::Step` for the first step whose budget ran out
    pub async fn run(&self, expected_agents: usize) -> Result<Vec<ZoneReport>, RolloverError> {
        let ops = self.ops.as_ref();
        let zones = self
            .executor
            .execute("list zones", self.query_budget, move || ops.list_zones())
            .await
            .map_err(|e| RolloverError::step(RunStep::ListZones, e))?;

        tracing::info!(
            "Replacing agents across {} zones, restoring {} agents after each",
            zones.len(),
            expected_agents
        );

        let mut cycle = ReplacementCycle::new();
        let mut reports = Vec::with_capacity(zones.len());
        for zone in zones {
            let report = self.replace_zone(&mut cycle, zone, expected_agents).await?;
            reports.push(report);
        }

        Ok(reports)
    }

    async fn replace_zone(
        &self,
        cycle: &mut ReplacementCycle,
        zone: ZoneId,
        expected_agents: usize,
    ) -> Result<ZoneReport, RolloverError> {
        let ops = self.ops.as_ref();
        let label = format!("list agents in zone {zone}");
        let zone_ref = &zone;
        let hosts = self
            .executor
            .execute(&label, self.query_budget, move || {
                ops.list_agents_in_zone(zone_ref)
            })
            .await
            .map_err(|e| RolloverError::step(RunStep::ListZoneAgents(zone.clone()), e))?;

        tracing::info!("Zone {}: replacing {} agents", zone, hosts.len());

        cycle.advance(ReplacementPhase::Replacing)?;
        let mut replaced = Vec::with_capacity(hosts.len());
        for host in hosts {
            let id = host.id.clone();
            self.executor
                .run_step(ops, ReplacementStep::terminate(host.clone(), self.terminate_budget))
                .await?;
            self.executor
                .run_step(ops, ReplacementStep::decommission(host, self.decommission_budget))
                .await?;
            replaced.push(id);
        }

        cycle.advance(ReplacementPhase::WaitingForRejoin)?;
        self.executor
            .run_step(
                ops,
                ReplacementStep::wait_for_rejoin(Role::Agent, expected_agents, self.rejoin_budget),
            )
            .await?;

        cycle.advance(ReplacementPhase::HealthChecking)?;
        self.gate
            .agents()
            .await
            .map_err(|e| e.at(GatePoint::AfterZone(zone.clone())))?;

        cycle.advance(ReplacementPhase::Done)?;
        tracing::info!("Zone {} replaced", zone);

        Ok(ZoneReport { zone, replaced })
    }
}

impl std::fmt::Debug for AgentSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSequencer")
            .field("query_budget", &self.query_budget)
            .field("terminate_budget", &self.terminate_budget)
            .field("decommission_budget", &self.decommission_budget)
            .field("rejoin_budget", &self.rejoin_budget)
            .finish_non_exhaustive()
    }
}
