//! Run configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! backup_before_run = true
//!
//! [retry]
//! budget = 60
//! backoff_unit_ms = 1000
//!
//! [budgets]
//! rejoin = 120
//! ```

use crate::error::RolloverError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default attempt budget for every retried call
pub const DEFAULT_RETRY_BUDGET: u32 = 60;

/// Default backoff unit (one second)
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

/// Linear backoff settings for the retrying executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before giving up
    pub budget: u32,
    /// Length of one backoff unit in milliseconds
    pub backoff_unit_ms: u64,
}

impl RetryConfig {
    /// Backoff unit as a duration
    #[inline]
    #[must_use]
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_RETRY_BUDGET,
            backoff_unit_ms: DEFAULT_BACKOFF_UNIT_MS,
        }
    }
}

/// Per-step overrides of the retry budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepBudgets {
    /// Each health probe
    pub health: Option<u32>,
    /// Instance termination
    pub terminate: Option<u32>,
    /// Agent decommission
    pub decommission: Option<u32>,
    /// Rejoin polling
    pub rejoin: Option<u32>,
    /// Inventory and zone queries
    pub inventory: Option<u32>,
}

/// Rolling replacement configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloverConfig {
    /// Executor backoff
    pub retry: RetryConfig,
    /// Per-step budget overrides
    pub budgets: StepBudgets,
    /// Run the backup collaborator before the pre-flight gate
    pub backup_before_run: bool,
}

impl RolloverConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, RolloverError> {
        let config: Self =
            toml::from_str(text).map_err(|e| RolloverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RolloverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RolloverError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// With retry budget
    #[inline]
    #[must_use]
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry.budget = budget;
        self
    }

    /// With backoff unit
    #[inline]
    #[must_use]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.retry.backoff_unit_ms = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With pre-flight backup
    #[inline]
    #[must_use]
    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_before_run = enabled;
        self
    }

    /// With per-step budgets
    #[inline]
    #[must_use]
    pub fn with_budgets(mut self, budgets: StepBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Budget for health probes
    #[inline]
    #[must_use]
    pub fn health_budget(&self) -> u32 {
        self.budgets.health.unwrap_or(self.retry.budget)
    }

    /// Budget for terminations
    #[inline]
    #[must_use]
    pub fn terminate_budget(&self) -> u32 {
        self.budgets.terminate.unwrap_or(self.retry.budget)
    }

    /// Budget for decommissions
    #[inline]
    #[must_use]
    pub fn decommission_budget(&self) -> u32 {
        self.budgets.decommission.unwrap_or(self.retry.budget)
    }

    /// Budget for rejoin waits
    #[inline]
    #[must_use]
    pub fn rejoin_budget(&self) -> u32 {
        self.budgets.rejoin.unwrap_or(self.retry.budget)
    }

    /// Budget for inventory queries
    #[inline]
    #[must_use]
    pub fn inventory_budget(&self) -> u32 {
        self.budgets.inventory.unwrap_or(self.retry.budget)
    }

    /// Reject budgets that could never succeed
    pub fn validate(&self) -> Result<(), RolloverError> {
        let budgets = [
            ("retry.budget", self.retry.budget),
            ("budgets.health", self.health_budget()),
            ("budgets.terminate", self.terminate_budget()),
            ("budgets.decommission", self.decommission_budget()),
            ("budgets.rejoin", self.rejoin_budget()),
            ("budgets.inventory", self.inventory_budget()),
        ];

        if let Some((name, _)) = budgets.iter().find(|(_, budget)| *budget == 0) {
            return Err(RolloverError::Config(format!("{name} must be at least 1")));
        }

        Ok(())
    }
}
