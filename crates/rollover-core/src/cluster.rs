//! External cluster collaborators
//!
//! Inventory discovery, health probes, instance termination, membership
//! changes and backups all live outside this crate. The orchestrator only
//! sees them through [`ClusterOps`]; every call is treated as fallible and
//! retried by the executor.

use crate::error::ClusterError;
use crate::types::{HealthCheckName, Node, Role, ZoneId};

/// Request/response contract with the cluster and its cloud provider
///
/// Implementations report failure with `ClusterError`; a single failed call
/// is transient and will be retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ClusterOps: Send + Sync {
    /// Masters currently in the cluster
    async fn list_masters(&self) -> Result<Vec<Node>, ClusterError>;

    /// Master currently holding leadership
    async fn current_leader(&self) -> Result<Node, ClusterError>;

    /// Agents currently in the cluster
    async fn list_agents(&self) -> Result<Vec<Node>, ClusterError>;

    /// Availability zones in replacement order
    async fn list_zones(&self) -> Result<Vec<ZoneId>, ClusterError>;

    /// Agents currently assigned to `zone`
    async fn list_agents_in_zone(&self, zone: &ZoneId) -> Result<Vec<Node>, ClusterError>;

    /// Run one health probe
    async fn check_health(&self, check: HealthCheckName) -> Result<(), ClusterError>;

    /// Terminate the node's instance
    async fn terminate_instance(&self, node: &Node) -> Result<(), ClusterError>;

    /// Remove the agent from cluster membership
    async fn decommission_agent(&self, node: &Node) -> Result<(), ClusterError>;

    /// Succeed only if the cluster reports exactly `expected` nodes of `role`
    async fn wait_for_count(&self, role: Role, expected: usize) -> Result<(), ClusterError>;

    /// Snapshot cluster state before any destructive action
    async fn backup_state(&self) -> Result<(), ClusterError> {
        Ok(())
    }
}
