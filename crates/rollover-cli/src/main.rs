use clap::{Arg, ArgAction, ArgMatches, Command};
use rollover_core::{ClusterOps, RolloverController, RunReport, RunResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod command;
mod config;

use command::{CommandCluster, AUTH_TOKEN_ENV};
use config::{CliConfig, CONFIG_ENV};

/// Exit status for configuration and bootstrap errors
const EXIT_CONFIG: i32 = 2;

/// Exit status when the run completed but its report could not be rendered
const EXIT_REPORT: i32 = 1;

fn cli() -> Command {
    Command::new("rollover")
        .version(rollover_core::VERSION)
        .about("Rolling replacement of cluster masters (leader last) and agents (zone by zone)")
        .arg(
            Arg::new("cluster")
                .required(true)
                .help("Cluster identifier/context passed to every command"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log individual retry attempts"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .env(CONFIG_ENV)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Configuration file (default: ./rollover.toml when present)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the run report as JSON"),
        )
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

fn controller(matches: &ArgMatches) -> anyhow::Result<RolloverController> {
    let cluster = matches
        .get_one::<String>("cluster")
        .ok_or_else(|| anyhow::anyhow!("cluster identifier is required"))?;
    let config = CliConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    let ops: Arc<dyn ClusterOps> = Arc::new(
        CommandCluster::new(cluster.as_str(), config.commands)
            .with_auth_token(std::env::var(AUTH_TOKEN_ENV).ok()),
    );
    Ok(RolloverController::new(cluster.as_str(), ops, config.rollover))
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    let controller = match controller(&matches) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let result = controller.run().await;
    let code = match &result {
        RunResult::Succeeded(report) => {
            let rendered = render_report(report, matches.get_flag("json"));
            match &rendered {
                Ok(output) => println!("{output}"),
                Err(e) => eprintln!("Failed to render report: {e:#}"),
            }
            exit_status(result.exit_code(), &rendered)
        }
        RunResult::Failed(e) => {
            eprintln!("Rolling replacement of {} FAILED", controller.cluster());
            eprintln!("  {e}");
            result.exit_code()
        }
    };

    std::process::exit(code);
}

fn render_report(report: &RunReport, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(report.to_json()?)
    } else {
        Ok(report.generate_text())
    }
}

/// A completed run whose report could not be written still fails the process
fn exit_status(run_code: i32, rendered: &anyhow::Result<String>) -> i32 {
    match rendered {
        Ok(_) => run_code,
        Err(_) => EXIT_REPORT,
    }
}
