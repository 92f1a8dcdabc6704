use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Failures surfaced to callers of the lifecycle operations.
///
/// Benign idempotency responses ("already loaded", "not loaded") and
/// corrupt on-disk descriptors never become a `LaunchError`: the first is
/// reported as a warning on a successful result, the second makes the
/// installer overwrite the file.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Descriptor, executable or the control program itself is missing.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Filesystem or service manager refused the operation.
    #[error("permission denied: {what}")]
    PermissionDenied { what: String },

    /// Non-zero exit (or error text) that matched no benign pattern.
    #[error("{program} failed (exit code {code:?}): {output}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Map an I/O error on `path` into the taxonomy, keeping `NotFound`
    /// and `PermissionDenied` distinguishable for callers.
    pub fn from_io(action: &str, path: &Path, source: std::io::Error) -> Self {
        let what = format!("{} {}", action, path.display());
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { what },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { what },
            _ => Self::Io {
                context: format!("failed to {}", what),
                source,
            },
        }
    }

    /// Short machine-readable classification name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::CommandFailed { .. } => "command_failed",
            Self::Timeout { .. } => "timeout",
            Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_keeps_not_found() {
        let err = LaunchError::from_io(
            "write",
            Path::new("/tmp/x.plist"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().contains("/tmp/x.plist"));
    }

    #[test]
    fn test_from_io_keeps_permission_denied() {
        let err = LaunchError::from_io(
            "write",
            Path::new("/Library/LaunchAgents/a.plist"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind(), "permission_denied");
    }

    #[test]
    fn test_timeout_message() {
        let err = LaunchError::Timeout {
            program: "launchctl".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "launchctl timed out after 10s");
    }
}
