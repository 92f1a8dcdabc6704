//! Scripted `CommandRunner` for tests: no process is ever spawned.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::{CommandOutput, CommandRunner};
use crate::error::LaunchError;

type ErrorFactory = Box<dyn Fn() -> LaunchError + Send + Sync>;

enum Scripted {
    Output(CommandOutput),
    Error(ErrorFactory),
}

/// Replies keyed by subcommand (the first argument). Queued replies are
/// consumed in order; once a queue is empty the default reply for that
/// subcommand is used, and failing that a silent exit 0.
#[derive(Default)]
pub struct FakeRunner {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    defaults: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<Vec<String>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for `subcommand`.
    pub fn push(&self, subcommand: &str, code: i32, output: &str) -> &Self {
        lock(&self.queued)
            .entry(subcommand.to_string())
            .or_default()
            .push_back(Scripted::Output(CommandOutput::new(Some(code), output)));
        self
    }

    /// Queue a one-shot runner error (spawn failure, timeout) for `subcommand`.
    pub fn push_error<F>(&self, subcommand: &str, make: F) -> &Self
    where
        F: Fn() -> LaunchError + Send + Sync + 'static,
    {
        lock(&self.queued)
            .entry(subcommand.to_string())
            .or_default()
            .push_back(Scripted::Error(Box::new(make)));
        self
    }

    /// Reply used for `subcommand` whenever its queue is empty.
    pub fn set_default(&self, subcommand: &str, code: i32, output: &str) -> &Self {
        lock(&self.defaults).insert(
            subcommand.to_string(),
            CommandOutput::new(Some(code), output),
        );
        self
    }

    /// Every invocation so far as `[program, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// First argument of every invocation, in order.
    pub fn subcommands(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|call| call.get(1).cloned().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput, LaunchError> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        lock(&self.calls).push(call);

        let subcommand = args.first().cloned().unwrap_or_default();
        let next = lock(&self.queued)
            .get_mut(&subcommand)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Error(make)) => Err(make()),
            None => Ok(lock(&self.defaults)
                .get(&subcommand)
                .cloned()
                .unwrap_or_else(|| CommandOutput::new(Some(0), ""))),
        }
    }
}
