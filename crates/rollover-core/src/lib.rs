//! Rollover Core - Rolling Node Replacement
//!
//! Replaces every node of a running cluster without losing quorum:
//! - Retries every external call with linear backoff and a bounded budget
//! - Gates every destructive step on cluster health
//! - Replaces masters one at a time, leader last
//! - Replaces agents zone by zone, waiting for rejoin in between
//!
//! # Example
//!
//! ```rust,ignore
//! use rollover_core::{RolloverConfig, RolloverController};
//! use std::sync::Arc;
//!
//! # async fn example(cluster: Arc<dyn rollover_core::ClusterOps>) {
//! let controller = RolloverController::new("prod-eu", cluster, RolloverConfig::new());
//! let result = controller.run().await;
//! std::process::exit(result.exit_code());
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod agents;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod health;
pub mod inventory;
pub mod masters;
pub mod report;
pub mod state_machine;
pub mod types;

// Re-exports for convenience
pub use agents::{AgentSequencer, ZoneReport};
pub use cluster::ClusterOps;
pub use config::{RetryConfig, RolloverConfig, StepBudgets};
pub use controller::RolloverController;
pub use error::{
    ClusterError, GatePoint, HealthGateError, InventoryQuery, RolloverError, RunStep, Timeout,
};
pub use executor::RetryingExecutor;
pub use health::{GateReport, HealthGate};
pub use inventory::Inventory;
pub use masters::MasterSequencer;
pub use report::{RunReport, RunResult};
pub use state_machine::{ReplacementCycle, ReplacementPhase};
pub use types::{
    ClusterSnapshot, HealthCheckName, Node, NodeId, ReplacementStep, Role, StepAction, ZoneId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Rollover Core
    pub use crate::{
        ClusterError, ClusterOps, ClusterSnapshot, HealthCheckName, Node, Role, RolloverConfig,
        RolloverController, RolloverError, RunResult, ZoneId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
