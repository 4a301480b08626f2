//! Binary configuration
//!
//! The core `RolloverConfig` plus the `[commands]` table that tells the
//! command adapter how to reach the cluster.
//!
//! ```toml
//! [retry]
//! budget = 30
//!
//! [commands]
//! list_masters = "cluster-ctl --context {cluster} masters"
//! terminate_instance = "cloud-ctl terminate {node}"
//! ```

use anyhow::{bail, Context, Result};
use rollover_core::RolloverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "ROLLOVER_CONFIG";

/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "rollover.toml";

/// Shell command templates, one per cluster operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub list_masters: String,
    pub current_leader: String,
    pub list_agents: String,
    pub list_zones: String,
    pub list_agents_in_zone: String,
    pub check_health: String,
    pub terminate_instance: String,
    pub decommission_agent: String,
    /// Optional; backups are skipped when unset
    pub backup_state: Option<String>,
}

impl CommandTemplates {
    fn required(&self) -> [(&'static str, &str); 8] {
        [
            ("list_masters", self.list_masters.as_str()),
            ("current_leader", self.current_leader.as_str()),
            ("list_agents", self.list_agents.as_str()),
            ("list_zones", self.list_zones.as_str()),
            ("list_agents_in_zone", self.list_agents_in_zone.as_str()),
            ("check_health", self.check_health.as_str()),
            ("terminate_instance", self.terminate_instance.as_str()),
            ("decommission_agent", self.decommission_agent.as_str()),
        ]
    }

    /// Names of required templates left empty
    pub fn missing(&self) -> Vec<&'static str> {
        self.required()
            .into_iter()
            .filter(|(_, template)| template.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Full binary configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub rollover: RolloverConfig,
    pub commands: CommandTemplates,
}

impl CliConfig {
    /// Parse from TOML text and validate
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("parsing configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file and validate
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in config {}", path.display()))
    }

    /// Load from the resolved path, or defaults when there is none
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match resolve_path(explicit) {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Reject zero budgets and missing command templates
    pub fn validate(&self) -> Result<()> {
        self.rollover.validate()?;

        let missing = self.commands.missing();
        if !missing.is_empty() {
            bail!("missing command templates: {}", missing.join(", "));
        }
        if self.rollover.backup_before_run && self.commands.backup_state.is_none() {
            bail!("backup_before_run is set but commands.backup_state is not");
        }

        Ok(())
    }
}

/// `--config` (or its env var) first, then `rollover.toml` if present
pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.is_file().then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const COMPLETE: &str = r#"
        [retry]
        budget = 5
        backoff_unit_ms = 250

        [budgets]
        rejoin = 90

        [commands]
        list_masters = "ctl masters {cluster}"
        current_leader = "ctl leader {cluster}"
        list_agents = "ctl agents {cluster}"
        list_zones = "ctl zones {cluster}"
        list_agents_in_zone = "ctl agents {cluster} --zone {zone}"
        check_health = "ctl health {cluster} {check}"
        terminate_instance = "cloud terminate {node}"
        decommission_agent = "ctl decommission {cluster} {node}"
    "#;

    #[test]
    fn complete_config_loads() {
        let config = CliConfig::from_toml_str(COMPLETE).unwrap();
        assert_eq!(config.rollover.retry.budget, 5);
        assert_eq!(config.rollover.rejoin_budget(), 90);
        assert_eq!(config.rollover.terminate_budget(), 5);
        assert_eq!(config.commands.terminate_instance, "cloud terminate {node}");
        assert!(config.commands.backup_state.is_none());
    }

    #[test]
    fn missing_templates_are_named() {
        let err = CliConfig::from_toml_str("[commands]\nlist_masters = \"x\"\n").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("current_leader"));
        assert!(!message.contains("list_masters,"));
    }

    #[test]
    fn defaults_are_rejected() {
        let err = CliConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("list_masters"));
    }

    #[test]
    fn backup_requires_template() {
        let text = format!("backup_before_run = true\n{COMPLETE}");
        assert!(CliConfig::from_toml_str(&text).is_err());

        let text = text.replace(
            "[commands]",
            "[commands]\nbackup_state = \"ctl snapshot {cluster}\"",
        );
        assert!(CliConfig::from_toml_str(&text).unwrap().rollover.backup_before_run);
    }

    #[test]
    fn zero_budget_rejected() {
        let text = COMPLETE.replace("budget = 5", "budget = 0");
        assert!(CliConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(COMPLETE.as_bytes()).unwrap();

        assert_eq!(resolve_path(Some(file.path())), Some(file.path().to_path_buf()));
        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.rollover.retry.backoff_unit_ms, 250);
    }
}
