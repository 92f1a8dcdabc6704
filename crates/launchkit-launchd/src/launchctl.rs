//! `launchctl`-backed service control: load/unload/list against the
//! per-user launchd domain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use launchkit_platform::command::CommandRunner;
use launchkit_platform::service::{
    BenignKind, ExecutionResult, ServiceControl, ServiceState, ServiceTarget, StatusReport,
};
use launchkit_platform::LaunchError;

use crate::classify::{self, Classification, Operation};

const LAUNCHCTL: &str = "launchctl";

/// Upper bound for a single `launchctl` invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LaunchctlClient {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl LaunchctlClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: LAUNCHCTL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exec(&self, op: Operation, subject: &str, args: Vec<String>) -> ExecutionResult {
        let output = match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!("{} {}: {}", self.program, args.join(" "), e);
                return ExecutionResult::failed(String::new(), e);
            }
        };

        match classify::classify(op, &output) {
            Classification::Success => ExecutionResult::ok(output.output),
            Classification::Benign(kind) => {
                warn!("{}: {} (treated as success)", subject, kind);
                ExecutionResult::benign(output.output, kind)
            }
            Classification::Failure(kind) => {
                let err = classify::failure_error(kind, &self.program, subject, &output);
                warn!("{}: {}", subject, err);
                ExecutionResult::failed(output.output, err)
            }
        }
    }
}

#[async_trait]
impl ServiceControl for LaunchctlClient {
    async fn load(&self, target: &ServiceTarget) -> ExecutionResult {
        info!("loading launch agent: {}", target.label);
        let path = target.descriptor_path.to_string_lossy().into_owned();
        let result = self
            .exec(
                Operation::Load,
                &format!("load {}", target.label),
                vec!["load".to_string(), "-w".to_string(), path],
            )
            .await;

        let ambiguous = matches!(
            &result.error,
            Some(LaunchError::CommandFailed { code, .. })
                if classify::is_ambiguous_load_failure(*code, &result.output)
        );
        if !ambiguous {
            return result;
        }

        // Only the listing can tell "already loaded" from a real I/O failure
        match self.status(target).await.state {
            Some(ServiceState::NotRunning) | None => result,
            Some(state) => {
                warn!(
                    "load {}: already registered ({:?}), treated as success",
                    target.label, state
                );
                ExecutionResult::benign(result.output, BenignKind::AlreadyLoaded)
            }
        }
    }

    async fn unload(&self, target: &ServiceTarget) -> ExecutionResult {
        info!("unloading launch agent: {}", target.label);
        // Without the descriptor on disk launchd can only be addressed by label
        let args = if tokio::fs::try_exists(&target.descriptor_path)
            .await
            .unwrap_or(false)
        {
            vec![
                "unload".to_string(),
                target.descriptor_path.to_string_lossy().into_owned(),
            ]
        } else {
            vec!["remove".to_string(), target.label.clone()]
        };
        self.exec(Operation::Unload, &format!("unload {}", target.label), args)
            .await
    }

    async fn status(&self, target: &ServiceTarget) -> StatusReport {
        let execution = self
            .exec(
                Operation::List,
                &format!("status {}", target.label),
                vec!["list".to_string()],
            )
            .await;
        let state = execution
            .is_success()
            .then(|| classify::parse_list(&execution.output, &target.label));
        StatusReport { state, execution }
    }
}
