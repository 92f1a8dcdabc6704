use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use launchkit_launchd::plist::{LaunchdPlist, VERSION_KEY};
use launchkit_platform::service::ServiceTarget;

/// Which variant of the agent the descriptor launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Release,
    Development,
}

impl BuildMode {
    pub fn from_release_only(release_only: bool) -> Self {
        if release_only {
            Self::Release
        } else {
            Self::Development
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Development => "development",
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved identity and contents of the agent's launch descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub label: String,
    pub descriptor_path: PathBuf,
    pub executable_path: PathBuf,
    pub arguments: Vec<String>,
    pub version: String,
    pub mode: BuildMode,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub environment: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn target(&self) -> ServiceTarget {
        ServiceTarget {
            label: self.label.clone(),
            descriptor_path: self.descriptor_path.clone(),
        }
    }

    pub fn to_plist(&self) -> LaunchdPlist {
        let mut program_arguments = Vec::with_capacity(self.arguments.len() + 1);
        program_arguments.push(self.executable_path.to_string_lossy().into_owned());
        program_arguments.extend(self.arguments.iter().cloned());

        let mut environment = self.environment.clone();
        environment.insert(VERSION_KEY.to_string(), self.version.clone());

        LaunchdPlist {
            label: self.label.clone(),
            program_arguments,
            run_at_load: self.run_at_load,
            keep_alive: self.keep_alive,
            standard_out_path: Some(self.stdout_path.to_string_lossy().into_owned()),
            standard_error_path: Some(self.stderr_path.to_string_lossy().into_owned()),
            environment,
        }
    }

    /// Descriptor file contents as written to disk
    pub fn render(&self) -> String {
        self.to_plist().render()
    }
}
