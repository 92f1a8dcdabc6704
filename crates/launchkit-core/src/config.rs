use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Base service label; development builds append `.devel`
    #[serde(default = "default_label")]
    pub label: String,

    /// Agent binary launched by release builds
    #[serde(default = "default_release_executable")]
    pub release_executable: PathBuf,

    /// Agent binary launched by development builds
    #[serde(default = "default_development_executable")]
    pub development_executable: PathBuf,

    #[serde(default = "default_release_arguments")]
    pub release_arguments: Vec<String>,

    #[serde(default = "default_development_arguments")]
    pub development_arguments: Vec<String>,

    /// Directory holding per-user launch agent descriptors
    /// (default: ~/Library/LaunchAgents)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_agents_dir: Option<PathBuf>,

    /// Directory for the agent's stdout/stderr logs
    /// (default: ~/Library/Logs/<label>)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub keep_alive: bool,

    #[serde(default = "default_true")]
    pub run_at_load: bool,

    /// Extra environment passed to the agent
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Upper bound for each launchctl invocation, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_label() -> String {
    "com.launchkit.agent".to_string()
}
fn default_release_executable() -> PathBuf {
    PathBuf::from("/Applications/Launchkit.app/Contents/SharedSupport/bin/launchkit-agent")
}
fn default_development_executable() -> PathBuf {
    PathBuf::from("/usr/local/bin/launchkit-agent")
}
fn default_release_arguments() -> Vec<String> {
    vec!["--run-mode=prod".to_string(), "service".to_string()]
}
fn default_development_arguments() -> Vec<String> {
    vec![
        "--run-mode=devel".to_string(),
        "--debug".to_string(),
        "service".to_string(),
    ]
}
fn default_true() -> bool {
    true
}
fn default_command_timeout() -> u64 {
    10
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            release_executable: default_release_executable(),
            development_executable: default_development_executable(),
            release_arguments: default_release_arguments(),
            development_arguments: default_development_arguments(),
            launch_agents_dir: None,
            log_dir: None,
            keep_alive: true,
            run_at_load: true,
            environment: BTreeMap::new(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl LaunchConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "launchkit", "launchkit") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("launchkit-config.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn launch_agents_dir(&self, home: &Path) -> PathBuf {
        self.launch_agents_dir
            .clone()
            .unwrap_or_else(|| home.join("Library").join("LaunchAgents"))
    }

    pub fn log_dir(&self, home: &Path, label: &str) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| home.join("Library").join("Logs").join(label))
    }
}
