use pretty_assertions::assert_eq;
use rollover_core::{
    ClusterOps, GatePoint, HealthCheckName, NodeId, Role, RolloverConfig, RolloverController,
    RunResult, RunStep, StepAction, ZoneId,
};
use rollover_test_utils::{Call, Failure, ScriptedCluster};
use std::sync::Arc;
use std::time::Duration;

fn config() -> RolloverConfig {
    RolloverConfig::new()
        .with_retry_budget(3)
        .with_backoff_unit(Duration::from_millis(10))
}

fn controller(cluster: &Arc<ScriptedCluster>) -> RolloverController {
    let ops: Arc<dyn ClusterOps> = cluster.clone();
    RolloverController::new("test-cluster", ops, config())
}

fn destructive_and_gates(calls: &[Call]) -> Vec<String> {
    calls
        .iter()
        .filter(|c| {
            matches!(
                c,
                Call::Terminate(_) | Call::Decommission(_) | Call::WaitForCount(..) | Call::Health(_)
            )
        })
        .map(ToString::to_string)
        .collect()
}

fn control_plane_gate() -> Vec<String> {
    HealthCheckName::CONTROL_PLANE_GATE
        .iter()
        .map(|c| format!("health({c})"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_reference_cluster_call_order() {
    let cluster = Arc::new(ScriptedCluster::reference());
    let result = controller(&cluster).run().await;
    assert!(result.passed());

    let mut expected = control_plane_gate();
    for master in ["A", "C", "B"] {
        expected.push(format!("terminate({master})"));
        expected.push("wait(master,3)".to_string());
        expected.extend(control_plane_gate());
    }
    for zone in [["a1", "a2"], ["a3", "a4"]] {
        for agent in zone {
            expected.push(format!("terminate({agent})"));
            expected.push(format!("decommission({agent})"));
        }
        expected.push("wait(agent,4)".to_string());
        expected.push("health(agent-snapshot)".to_string());
    }

    assert_eq!(destructive_and_gates(&cluster.calls()), expected);

    // Final snapshot comes after the last zone
    let calls = cluster.calls();
    let last_gate = calls
        .iter()
        .rposition(|c| *c == Call::Health(HealthCheckName::AgentSnapshot))
        .unwrap();
    assert_eq!(
        &calls[last_gate + 1..],
        &[Call::ListMasters, Call::CurrentLeader, Call::ListAgents]
    );
}

#[tokio::test(start_paused = true)]
async fn test_preflight_consensus_failure_terminates_nothing() {
    let cluster = Arc::new(
        ScriptedCluster::reference()
            .fail(Call::Health(HealthCheckName::ConsensusStore), Failure::Always),
    );
    let result = controller(&cluster).run().await;

    assert_eq!(result.exit_code(), 1);
    assert!(cluster
        .calls()
        .iter()
        .all(|c| !matches!(c, Call::Terminate(_) | Call::Decommission(_))));
    assert_eq!(cluster.count(&Call::Health(HealthCheckName::ConsensusStore)), 3);

    let RunResult::Failed(err) = result else {
        panic!("run should fail");
    };
    assert_eq!(err.failed_check(), Some(HealthCheckName::ConsensusStore));
    assert!(err.to_string().contains("consensus-store"));
}

#[tokio::test(start_paused = true)]
async fn test_leader_replaced_after_all_followers_settle() {
    let cluster = Arc::new(ScriptedCluster::reference());
    assert!(controller(&cluster).run().await.passed());

    let leader = cluster.position(&Call::Terminate("B".to_string())).unwrap();
    let calls = cluster.calls();
    let follower_gates = calls[..leader]
        .iter()
        .filter(|c| **c == Call::Health(HealthCheckName::CoordinationService))
        .count();

    // Pre-flight plus one gate per follower
    assert_eq!(follower_gates, 3);
    assert!(cluster.position(&Call::Terminate("A".to_string())).unwrap() < leader);
    assert!(cluster.position(&Call::Terminate("C".to_string())).unwrap() < leader);
}

#[tokio::test(start_paused = true)]
async fn test_zones_processed_strictly_in_order() {
    let cluster = Arc::new(ScriptedCluster::reference());
    assert!(controller(&cluster).run().await.passed());

    let z1_gate = cluster
        .position(&Call::Health(HealthCheckName::AgentSnapshot))
        .unwrap();
    let z2_query = cluster
        .position(&Call::ListAgentsInZone("z2".to_string()))
        .unwrap();
    let z2_first = cluster.position(&Call::Terminate("a3".to_string())).unwrap();

    assert!(z1_gate < z2_query);
    assert!(z2_query < z2_first);
}

#[tokio::test(start_paused = true)]
async fn test_failed_zone_gate_stops_next_zone() {
    let cluster = Arc::new(
        ScriptedCluster::reference()
            .fail(Call::Health(HealthCheckName::AgentSnapshot), Failure::Always),
    );
    let result = controller(&cluster).run().await;

    assert_eq!(result.exit_code(), 1);
    assert_eq!(
        result.failed_step(),
        Some(&RunStep::HealthGate {
            point: GatePoint::AfterZone(ZoneId::new("z1")),
            check: HealthCheckName::AgentSnapshot,
        })
    );
    assert_eq!(cluster.count(&Call::WaitForCount(Role::Agent, 4)), 1);
    assert!(cluster.position(&Call::ListAgentsInZone("z2".to_string())).is_none());
    assert!(cluster.position(&Call::Terminate("a3".to_string())).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_zone_rejoin_stops_next_zone() {
    let cluster = Arc::new(
        ScriptedCluster::reference().fail(Call::WaitForCount(Role::Agent, 4), Failure::Always),
    );
    let result = controller(&cluster).run().await;

    assert_eq!(result.exit_code(), 1);
    assert_eq!(
        result.failed_step(),
        Some(&RunStep::Replace(StepAction::WaitForRejoin {
            role: Role::Agent,
            expected: 4,
        }))
    );
    assert_eq!(cluster.count(&Call::WaitForCount(Role::Agent, 4)), 3);
    assert!(cluster.position(&Call::Health(HealthCheckName::AgentSnapshot)).is_none());
    assert!(cluster.position(&Call::ListAgentsInZone("z2".to_string())).is_none());
    assert!(cluster.position(&Call::Terminate("a3".to_string())).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_counts_match_snapshot() {
    let cluster = Arc::new(ScriptedCluster::reference());
    assert!(controller(&cluster).run().await.passed());

    assert_eq!(cluster.count(&Call::WaitForCount(Role::Master, 3)), 3);
    assert_eq!(cluster.count(&Call::WaitForCount(Role::Agent, 4)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_absorbed() {
    let cluster = Arc::new(
        ScriptedCluster::reference()
            .fail(Call::Terminate("C".to_string()), Failure::Times(2))
            .fail(Call::WaitForCount(Role::Agent, 4), Failure::Times(1)),
    );
    let result = controller(&cluster).run().await;

    assert!(result.passed());
    assert_eq!(cluster.count(&Call::Terminate("C".to_string())), 3);
}

#[tokio::test(start_paused = true)]
async fn test_leader_gate_failure_is_fatal() {
    // Pre-flight, A and C gates pass; the gate after leader B never does
    let cluster = Arc::new(
        ScriptedCluster::reference()
            .fail(Call::Health(HealthCheckName::CoordinationService), Failure::After(3)),
    );
    let result = controller(&cluster).run().await;

    assert_eq!(result.exit_code(), 1);
    assert_eq!(
        result.failed_step(),
        Some(&RunStep::HealthGate {
            point: GatePoint::AfterMaster(NodeId::new("B")),
            check: HealthCheckName::CoordinationService,
        })
    );
    assert!(cluster.position(&Call::Terminate("B".to_string())).is_some());
    assert!(cluster.position(&Call::ListZones).is_none());
    assert!(cluster.position(&Call::Terminate("a1".to_string())).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_master_rejoin_stops_run() {
    let cluster = Arc::new(
        ScriptedCluster::reference().fail(Call::WaitForCount(Role::Master, 3), Failure::Always),
    );
    let result = controller(&cluster).run().await;

    assert_eq!(result.exit_code(), 1);
    assert_eq!(cluster.count(&Call::Terminate("A".to_string())), 1);
    assert!(cluster.position(&Call::Terminate("C".to_string())).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_backup_runs_first_when_enabled() {
    let cluster = Arc::new(ScriptedCluster::reference());
    let ops: Arc<dyn ClusterOps> = cluster.clone();
    let controller = RolloverController::new("test-cluster", ops, config().with_backup(true));
    assert!(controller.run().await.passed());
    assert_eq!(cluster.calls().first(), Some(&Call::Backup));
}

#[tokio::test(start_paused = true)]
async fn test_report_reflects_run() {
    let cluster = Arc::new(ScriptedCluster::reference());
    let RunResult::Succeeded(report) = controller(&cluster).run().await else {
        panic!("run should succeed");
    };

    let replaced: Vec<&str> = report.replaced_masters.iter().map(|id| id.as_str()).collect();
    assert_eq!(replaced, vec!["A", "C", "B"]);
    assert_eq!(report.agents_replaced(), 4);
    assert_eq!(report.before.leader().id.as_str(), "B");
    assert_eq!(report.after.master_count(), 3);
}
