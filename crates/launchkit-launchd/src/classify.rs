//! Pure interpretation of `launchctl` output. No process is spawned here.

use launchkit_platform::command::CommandOutput;
use launchkit_platform::service::{BenignKind, ServiceState};
use launchkit_platform::LaunchError;

/// Which control command produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Unload,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    PermissionDenied,
    CommandFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Benign(BenignKind),
    Failure(FailureKind),
}

const ALREADY_LOADED: &[&str] = &["already loaded"];
const NOT_LOADED: &[&str] = &[
    "could not find specified service",
    "not loaded",
    "no such process",
];
// ESRCH and "service not found in domain", sometimes printed without text
const NOT_LOADED_CODES: &[i32] = &[3, 113];
const NOT_FOUND: &[&str] = &["no such file or directory"];
const PERMISSION: &[&str] = &["permission denied", "operation not permitted"];
// launchctl load/unload often exit 0 while printing one of these
const FAILURE_MARKERS: &[&str] = &["failed", "invalid property list", "error"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classify one command's exit code and text.
pub fn classify(op: Operation, result: &CommandOutput) -> Classification {
    let text = result.output.to_lowercase();

    match op {
        Operation::Load if contains_any(&text, ALREADY_LOADED) => {
            return Classification::Benign(BenignKind::AlreadyLoaded)
        }
        Operation::Unload
            if contains_any(&text, NOT_LOADED)
                || (text.trim().is_empty()
                    && result.code.is_some_and(|c| NOT_LOADED_CODES.contains(&c))) =>
        {
            return Classification::Benign(BenignKind::NotLoaded)
        }
        _ => {}
    }

    let failed = !result.success()
        || (op != Operation::List && contains_any(&text, FAILURE_MARKERS))
        || (op != Operation::List && contains_any(&text, NOT_FOUND))
        || (op != Operation::List && contains_any(&text, PERMISSION));
    if !failed {
        return Classification::Success;
    }

    if contains_any(&text, NOT_FOUND) {
        Classification::Failure(FailureKind::NotFound)
    } else if contains_any(&text, PERMISSION) {
        Classification::Failure(FailureKind::PermissionDenied)
    } else {
        Classification::Failure(FailureKind::CommandFailed)
    }
}

// Newer launchd answers a load of an already-loaded job with EIO (5) or
// EINPROGRESS (37) instead of "already loaded"
const AMBIGUOUS_LOAD_CODES: &[i32] = &[5, 37];
const AMBIGUOUS_LOAD: &[&str] = &["5: input/output error", "37: operation now in progress"];

/// Whether a failed load may only mean the job is already loaded. Callers
/// must confirm against the listing before treating it as benign.
pub fn is_ambiguous_load_failure(code: Option<i32>, output: &str) -> bool {
    code.is_some_and(|c| AMBIGUOUS_LOAD_CODES.contains(&c))
        || contains_any(&output.to_lowercase(), AMBIGUOUS_LOAD)
}

/// Build the error value for a failure classification.
pub fn failure_error(
    kind: FailureKind,
    program: &str,
    subject: &str,
    result: &CommandOutput,
) -> LaunchError {
    let detail = result.output.trim();
    match kind {
        FailureKind::NotFound => LaunchError::NotFound {
            what: format!("{} ({})", subject, detail),
        },
        FailureKind::PermissionDenied => LaunchError::PermissionDenied {
            what: format!("{} ({})", subject, detail),
        },
        FailureKind::CommandFailed => LaunchError::CommandFailed {
            program: program.to_string(),
            code: result.code,
            output: detail.to_string(),
        },
    }
}

/// Find `label` in `launchctl list` output (`PID\tStatus\tLabel` rows).
pub fn parse_list(output: &str, label: &str) -> ServiceState {
    for line in output.lines() {
        let parts: Vec<&str> = if line.contains('\t') {
            line.splitn(3, '\t').map(str::trim).collect()
        } else {
            line.split_whitespace().collect()
        };
        if parts.len() < 3 || parts[2] != label {
            continue;
        }

        let pid = parts[0].parse::<u32>().ok();
        let last_exit_status = parts[1].parse::<i32>().unwrap_or(0);
        return if last_exit_status == 0 {
            ServiceState::Running { pid }
        } else {
            ServiceState::RunningWithErrors {
                pid,
                last_exit_status,
            }
        };
    }
    ServiceState::NotRunning
}
