use std::time::Duration;

use async_trait::async_trait;

use crate::error::LaunchError;

/// Captured result of one external command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    /// Combined stdout and stderr text
    pub output: String,
}

impl CommandOutput {
    pub fn new(code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs on behalf of the service control client.
///
/// Production code spawns real processes; tests substitute a scripted
/// runner so no service manager is touched.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, waiting at most `timeout`.
    ///
    /// A process that runs and exits non-zero is NOT an error here: the
    /// exit code and text are returned for classification. Errors are
    /// reserved for spawn failures and timeouts.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, LaunchError>;
}
