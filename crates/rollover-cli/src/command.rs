//! Command-backed cluster adapter
//!
//! Every `ClusterOps` call renders a shell template from the config and runs
//! it with `sh -c`. Listing commands print one node per line, `<id> [zone]`;
//! blank lines and `#` comments are skipped.

use crate::config::CommandTemplates;
use rollover_core::{ClusterError, ClusterOps, HealthCheckName, Node, NodeId, Role, ZoneId};
use std::process::Stdio;
use tokio::process::Command;

/// Environment variable carrying the cluster credential
pub const AUTH_TOKEN_ENV: &str = "ROLLOVER_AUTH_TOKEN";

/// Runs configured shell commands against one cluster
pub struct CommandCluster {
    cluster: String,
    templates: CommandTemplates,
    auth_token: Option<String>,
}

impl CommandCluster {
    /// Create adapter for `cluster`
    pub fn new(cluster: impl Into<String>, templates: CommandTemplates) -> Self {
        Self {
            cluster: cluster.into(),
            templates,
            auth_token: None,
        }
    }

    /// Forward `token` to every child process
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    async fn run(
        &self,
        operation: &str,
        template: &str,
        vars: &[(&str, &str)],
    ) -> Result<String, ClusterError> {
        let command = render(template, &self.cluster, vars);
        tracing::debug!("{}: {}", operation, command);

        let mut child = Command::new("sh");
        child
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(token) = &self.auth_token {
            child.env(AUTH_TOKEN_ENV, token);
        }

        let output = child
            .output()
            .await
            .map_err(|e| ClusterError::io(operation, e))?;

        if !output.status.success() {
            return Err(ClusterError::CommandFailed {
                command: operation.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|_| ClusterError::invalid_output(operation, "stdout is not valid UTF-8"))
    }

    async fn nodes(
        &self,
        operation: &str,
        template: &str,
        vars: &[(&str, &str)],
        role: Role,
    ) -> Result<Vec<Node>, ClusterError> {
        let mut vars = vars.to_vec();
        vars.push(("role", role.as_str()));
        let stdout = self.run(operation, template, &vars).await?;
        parse_nodes(operation, &stdout, role)
    }
}

impl std::fmt::Debug for CommandCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCluster")
            .field("cluster", &self.cluster)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ClusterOps for CommandCluster {
    async fn list_masters(&self) -> Result<Vec<Node>, ClusterError> {
        self.nodes("list masters", &self.templates.list_masters, &[], Role::Master)
            .await
    }

    async fn current_leader(&self) -> Result<Node, ClusterError> {
        let mut nodes = self
            .nodes("current leader", &self.templates.current_leader, &[], Role::Master)
            .await?;
        match nodes.len() {
            1 => Ok(nodes.remove(0)),
            0 => Err(ClusterError::invalid_output("current leader", "no leader reported")),
            n => Err(ClusterError::invalid_output(
                "current leader",
                format!("{n} leaders reported"),
            )),
        }
    }

    async fn list_agents(&self) -> Result<Vec<Node>, ClusterError> {
        self.nodes("list agents", &self.templates.list_agents, &[], Role::Agent)
            .await
    }

    async fn list_zones(&self) -> Result<Vec<ZoneId>, ClusterError> {
        let stdout = self.run("list zones", &self.templates.list_zones, &[]).await?;
        Ok(meaningful_lines(&stdout).map(ZoneId::new).collect())
    }

    async fn list_agents_in_zone(&self, zone: &ZoneId) -> Result<Vec<Node>, ClusterError> {
        let agents = self
            .nodes(
                "list agents in zone",
                &self.templates.list_agents_in_zone,
                &[("zone", zone.as_str())],
                Role::Agent,
            )
            .await?;

        // Zone column is optional here; the queried zone is authoritative
        Ok(agents
            .into_iter()
            .map(|node| node.in_zone(zone.clone()))
            .collect())
    }

    async fn check_health(&self, check: HealthCheckName) -> Result<(), ClusterError> {
        match self
            .run("check health", &self.templates.check_health, &[("check", check.as_str())])
            .await
        {
            Ok(_) => Ok(()),
            Err(ClusterError::CommandFailed { stderr, .. }) => Err(ClusterError::Unhealthy {
                check,
                reason: stderr,
            }),
            Err(e) => Err(e),
        }
    }

    async fn terminate_instance(&self, node: &Node) -> Result<(), ClusterError> {
        let role = node.role.as_str();
        self.run(
            "terminate instance",
            &self.templates.terminate_instance,
            &[("node", node.id.as_str()), ("role", role)],
        )
        .await
        .map(drop)
    }

    async fn decommission_agent(&self, node: &Node) -> Result<(), ClusterError> {
        let zone = node.zone.as_ref().map_or("", ZoneId::as_str);
        self.run(
            "decommission agent",
            &self.templates.decommission_agent,
            &[("node", node.id.as_str()), ("zone", zone), ("role", node.role.as_str())],
        )
        .await
        .map(drop)
    }

    async fn wait_for_count(&self, role: Role, expected: usize) -> Result<(), ClusterError> {
        let actual = match role {
            Role::Master => self.list_masters().await?.len(),
            Role::Agent => self.list_agents().await?.len(),
        };
        if actual == expected {
            Ok(())
        } else {
            Err(ClusterError::CountMismatch {
                role,
                expected,
                actual,
            })
        }
    }

    async fn backup_state(&self) -> Result<(), ClusterError> {
        match &self.templates.backup_state {
            Some(template) => self.run("backup state", template, &[]).await.map(drop),
            None => Ok(()),
        }
    }
}

/// Substitute `{cluster}` and `vars` into `template`, shell-quoting values
///
/// Single left-to-right pass: substituted values are never rescanned, and
/// braces that do not name a known placeholder are copied unchanged.
fn render(template: &str, cluster: &str, vars: &[(&str, &str)]) -> String {
    let lookup = |name: &str| {
        if name == "cluster" {
            Some(cluster)
        } else {
            vars.iter().find(|(key, _)| *key == name).map(|(_, value)| *value)
        }
    };

    let mut command = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        command.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| lookup(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                command.push_str(&shell_quote(value));
                rest = &after[close + 1..];
            }
            None => {
                command.push('{');
                rest = after;
            }
        }
    }
    command.push_str(rest);
    command
}

fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '='));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn meaningful_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn parse_nodes(operation: &str, output: &str, role: Role) -> Result<Vec<Node>, ClusterError> {
    meaningful_lines(output)
        .map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next().unwrap_or_default();
            let zone = fields.next().map(ZoneId::new);
            if fields.next().is_some() {
                return Err(ClusterError::invalid_output(
                    operation,
                    format!("expected `<id> [zone]`, got `{line}`"),
                ));
            }
            Ok(Node {
                id: NodeId::new(id),
                role,
                zone,
            })
        })
        .collect()
}
