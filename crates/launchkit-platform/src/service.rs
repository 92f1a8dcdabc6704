use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LaunchError;

/// What the service manager needs to address one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub label: String,
    pub descriptor_path: PathBuf,
}

/// Idempotency responses that are reported as warnings, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenignKind {
    AlreadyLoaded,
    NotLoaded,
}

impl std::fmt::Display for BenignKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyLoaded => f.write_str("already loaded"),
            Self::NotLoaded => f.write_str("not loaded"),
        }
    }
}

/// Outcome of one external-command invocation.
///
/// `output` is always populated with whatever the command printed, even
/// when `error` is set.
#[derive(Debug)]
pub struct ExecutionResult {
    pub output: String,
    pub error: Option<LaunchError>,
    pub warning: Option<BenignKind>,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
            warning: None,
        }
    }

    pub fn benign(output: impl Into<String>, kind: BenignKind) -> Self {
        Self {
            output: output.into(),
            error: None,
            warning: Some(kind),
        }
    }

    pub fn failed(output: impl Into<String>, error: LaunchError) -> Self {
        Self {
            output: output.into(),
            error: Some(error),
            warning: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the `(error, output)` pair handed to completion callbacks.
    pub fn into_parts(self) -> (Option<LaunchError>, String) {
        (self.error, self.output)
    }
}

/// Result of unload followed by load.
#[derive(Debug)]
pub struct ReloadResult {
    /// Non-benign unload failure that reload forced through
    pub unload_error: Option<LaunchError>,
    pub unload_output: String,
    pub load: ExecutionResult,
}

impl ReloadResult {
    /// Both halves succeeded (benign warnings allowed).
    pub fn is_clean(&self) -> bool {
        self.unload_error.is_none() && self.load.is_success()
    }

    /// Collapse into a single `(error, output)` pair. The load error wins
    /// over the unload error; output carries both commands' text.
    pub fn into_parts(self) -> (Option<LaunchError>, String) {
        let output = match (self.unload_output.is_empty(), self.load.output.is_empty()) {
            (true, _) => self.load.output,
            (false, true) => self.unload_output,
            (false, false) => format!("{}\n{}", self.unload_output, self.load.output),
        };
        (self.load.error.or(self.unload_error), output)
    }
}

/// Registration state reported by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceState {
    NotRunning,
    Running {
        pid: Option<u32>,
    },
    RunningWithErrors {
        pid: Option<u32>,
        last_exit_status: i32,
    },
}

/// Outcome of a status query. `state` is `None` when the listing itself
/// could not be obtained; `execution.error` says why.
#[derive(Debug)]
pub struct StatusReport {
    pub state: Option<ServiceState>,
    pub execution: ExecutionResult,
}

/// The host service manager's control interface.
///
/// Each call issues one external command and observes its text; nothing
/// about the registry is cached between calls.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Register the descriptor and start the service
    async fn load(&self, target: &ServiceTarget) -> ExecutionResult;

    /// Deregister the service
    async fn unload(&self, target: &ServiceTarget) -> ExecutionResult;

    /// Query whether the service is registered and running
    async fn status(&self, target: &ServiceTarget) -> StatusReport;

    /// Unload, then load once unload has completed, whatever its outcome.
    async fn reload(&self, target: &ServiceTarget) -> ReloadResult {
        let unload = self.unload(target).await;
        let load = self.load(target).await;
        ReloadResult {
            unload_error: unload.error,
            unload_output: unload.output,
            load,
        }
    }
}
