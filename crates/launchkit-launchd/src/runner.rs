//! Production `CommandRunner`: tokio process execution with a hard timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::debug;

use launchkit_platform::command::{CommandOutput, CommandRunner};
use launchkit_platform::LaunchError;

/// Spawns real processes. A command that outlives its timeout is killed
/// and reported as `LaunchError::Timeout`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, LaunchError> {
        debug!("exec: {} {}", program, args.join(" "));

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LaunchError::NotFound {
                    what: format!("executable {}", program),
                },
                std::io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied {
                    what: format!("execute {}", program),
                },
                _ => LaunchError::Io {
                    context: format!("failed to spawn {}", program),
                    source: e,
                },
            })?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let status = status.map_err(|e| LaunchError::Io {
                    context: format!("waiting for {}", program),
                    source: e,
                })?;
                Ok::<_, LaunchError>(CommandOutput::new(status.code(), combine(&stdout, &stderr)))
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                Err(LaunchError::Timeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        }
    }
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let (stdout, stderr) = (stdout.trim_end(), stderr.trim_end());
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stdout, stderr),
    }
}
