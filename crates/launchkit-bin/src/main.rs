use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use launchkit_core::{resolver, BuildMode, LaunchConfig, LaunchController};
use launchkit_launchd::launchctl::LaunchctlClient;
use launchkit_launchd::runner::TokioCommandRunner;
use launchkit_platform::service::{ExecutionResult, ServiceState};

mod install;

#[derive(Parser, Debug)]
#[command(name = "launchkit")]
#[command(about = "Install and control the agent's per-user launchd service")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(long, env = "LAUNCHKIT_CONFIG_PATH", global = true)]
    config_path: Option<String>,

    /// Manage the development agent instead of the release one
    #[arg(long, global = true)]
    development: bool,

    /// Version token embedded in the descriptor (default: this build's version)
    #[arg(long, env = "LAUNCHKIT_DESCRIPTOR_VERSION", global = true)]
    descriptor_version: Option<String>,

    /// Timeout for each launchctl invocation, in seconds
    #[arg(long, env = "LAUNCHKIT_TIMEOUT_SECS", global = true)]
    timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LAUNCHKIT_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write or update the descriptor and make sure the agent is loaded
    Install,
    /// Unload the agent and delete its descriptor
    Uninstall,
    /// Register the descriptor with launchd and start the agent
    Load,
    /// Deregister the agent from launchd
    Unload,
    /// Unload, then load
    Reload,
    /// Report whether launchd lists the agent
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the descriptor that would be installed, without touching disk
    Print,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    label: &'a str,
    descriptor_path: &'a std::path::Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<ServiceState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    output: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so `print` output stays clean)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config_path
        .map(PathBuf::from)
        .unwrap_or_else(LaunchConfig::default_path);
    let mut config = LaunchConfig::load_or_default(&config_path)?;

    // CLI args override config file
    if let Some(secs) = cli.timeout_secs {
        config.command_timeout_secs = secs;
    }

    let home = directories::BaseDirs::new()
        .context("could not determine home directory")?
        .home_dir()
        .to_path_buf();
    let mode = BuildMode::from_release_only(!cli.development);
    let version = cli
        .descriptor_version
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    let descriptor = resolver::resolve(&config, &home, mode, &version);

    info!(
        "launchkit v{} ({} agent {}, descriptor v{})",
        env!("CARGO_PKG_VERSION"),
        mode,
        descriptor.label,
        descriptor.version,
    );

    if let Commands::Print = cli.command {
        print!("{}", descriptor.render());
        return Ok(());
    }

    let client = LaunchctlClient::new(Arc::new(TokioCommandRunner::new()))
        .with_timeout(config.command_timeout());
    let controller = LaunchController::new(Arc::new(client), descriptor);

    match cli.command {
        Commands::Install => install::run_install(&controller).await,
        Commands::Uninstall => install::run_uninstall(&controller).await,
        Commands::Load => report("load", controller.load().await),
        Commands::Unload => report("unload", controller.unload().await),
        Commands::Reload => {
            let result = controller.reload().await;
            if let Some(e) = &result.unload_error {
                warn!("unload failed before reload: {}", e);
            }
            let (error, output) = result.into_parts();
            print_output(&output);
            match error {
                Some(e) => Err(anyhow::Error::new(e).context("reload failed")),
                None => Ok(()),
            }
        }
        Commands::Status { json } => {
            let report = controller.status().await;
            let descriptor = controller.descriptor();
            if json {
                let doc = StatusJson {
                    label: &descriptor.label,
                    descriptor_path: &descriptor.descriptor_path,
                    service: report.state,
                    error: report.execution.error.as_ref().map(ToString::to_string),
                    output: &report.execution.output,
                };
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else if let Some(state) = report.state {
                println!("{}: {}", descriptor.label, describe(state));
            }
            match report.execution.error {
                Some(e) => Err(anyhow::Error::new(e).context("status query failed")),
                None => Ok(()),
            }
        }
        Commands::Print => Ok(()),
    }
}

fn report(op: &str, result: ExecutionResult) -> Result<()> {
    if let Some(kind) = result.warning {
        info!("{}: {}", op, kind);
    }
    let (error, output) = result.into_parts();
    print_output(&output);
    match error {
        Some(e) => Err(anyhow::Error::new(e).context(format!("{} failed", op))),
        None => Ok(()),
    }
}

fn print_output(output: &str) {
    if !output.trim().is_empty() {
        println!("{}", output.trim_end());
    }
}

fn describe(state: ServiceState) -> String {
    match state {
        ServiceState::NotRunning => "not running".to_string(),
        ServiceState::Running { pid: Some(pid) } => format!("running (pid {})", pid),
        ServiceState::Running { pid: None } => "loaded, not running".to_string(),
        ServiceState::RunningWithErrors {
            pid,
            last_exit_status,
        } => match pid {
            Some(pid) => format!("running (pid {}), last exit status {}", pid, last_exit_status),
            None => format!("loaded, last exit status {}", last_exit_status),
        },
    }
}
