//! Computes the expected launch descriptor from configuration alone.
//!
//! Resolution performs no I/O and cannot fail: identical inputs always
//! yield identical descriptors, which is what lets the installer decide
//! between "skip" and "overwrite" by plain comparison.

use std::path::Path;

use crate::config::LaunchConfig;
use crate::descriptor::{BuildMode, ServiceDescriptor};

const DEVELOPMENT_SUFFIX: &str = ".devel";
const RUN_MODE_KEY: &str = "LAUNCHKIT_RUN_MODE";

pub fn resolve(
    config: &LaunchConfig,
    home: &Path,
    mode: BuildMode,
    version: &str,
) -> ServiceDescriptor {
    let label = match mode {
        BuildMode::Release => config.label.clone(),
        BuildMode::Development => format!("{}{}", config.label, DEVELOPMENT_SUFFIX),
    };
    let (executable_path, arguments) = match mode {
        BuildMode::Release => (
            config.release_executable.clone(),
            config.release_arguments.clone(),
        ),
        BuildMode::Development => (
            config.development_executable.clone(),
            config.development_arguments.clone(),
        ),
    };

    let descriptor_path = config
        .launch_agents_dir(home)
        .join(format!("{}.plist", label));
    let log_dir = config.log_dir(home, &label);

    let mut environment = config.environment.clone();
    environment.insert(RUN_MODE_KEY.to_string(), mode.as_str().to_string());

    ServiceDescriptor {
        descriptor_path,
        executable_path,
        arguments,
        version: version.to_string(),
        mode,
        run_at_load: config.run_at_load,
        keep_alive: config.keep_alive,
        stdout_path: log_dir.join("agent.log"),
        stderr_path: log_dir.join("agent.err.log"),
        environment,
        label,
    }
}
