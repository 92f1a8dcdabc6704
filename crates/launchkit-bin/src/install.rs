//! `install` / `uninstall` subcommands.

use anyhow::{Context, Result};
use tracing::info;

use launchkit_core::{InstallOutcome, LaunchController};

/// Bring the descriptor up to date and make sure the agent is registered.
///
/// Safe to run on every application launch.
pub async fn run_install(controller: &LaunchController) -> Result<()> {
    let descriptor = controller.descriptor();
    let outcome = controller
        .install_launch_agent()
        .await
        .with_context(|| format!("failed to install launch agent {}", descriptor.label))?;

    match outcome {
        InstallOutcome::Reloaded => info!(
            "launch agent {} v{} installed and (re)loaded from {}",
            descriptor.label,
            descriptor.version,
            descriptor.descriptor_path.display()
        ),
        InstallOutcome::Loaded => info!("launch agent {} loaded", descriptor.label),
        InstallOutcome::AlreadyRunning => {
            info!("launch agent {} already current and running", descriptor.label)
        }
    }
    Ok(())
}

/// Unload the agent and delete its descriptor.
pub async fn run_uninstall(controller: &LaunchController) -> Result<()> {
    let descriptor = controller.descriptor();
    let removed = controller
        .uninstall()
        .await
        .with_context(|| format!("failed to uninstall launch agent {}", descriptor.label))?;

    if removed {
        info!(
            "launch agent {} uninstalled, removed {}",
            descriptor.label,
            descriptor.descriptor_path.display()
        );
    } else {
        info!("launch agent {} was not installed", descriptor.label);
    }
    Ok(())
}
