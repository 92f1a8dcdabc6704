//! Lifecycle controller for the agent's launch descriptor and registration.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use launchkit_platform::service::{
    ExecutionResult, ReloadResult, ServiceControl, ServiceState, StatusReport,
};
use launchkit_platform::LaunchError;

use crate::descriptor::ServiceDescriptor;
use crate::installer;

/// What `install_launch_agent` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Descriptor was (re)written and the service reloaded
    Reloaded,
    /// Descriptor was current but the service was not running
    Loaded,
    /// Nothing to do
    AlreadyRunning,
}

/// Binds one resolved descriptor to a service control backend.
///
/// Operations on the same label must not be issued concurrently; launchd
/// itself arbitrates conflicting registrations.
pub struct LaunchController {
    control: Arc<dyn ServiceControl>,
    descriptor: ServiceDescriptor,
}

impl LaunchController {
    pub fn new(control: Arc<dyn ServiceControl>, descriptor: ServiceDescriptor) -> Self {
        Self {
            control,
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub async fn load(&self) -> ExecutionResult {
        self.control.load(&self.descriptor.target()).await
    }

    pub async fn unload(&self) -> ExecutionResult {
        self.control.unload(&self.descriptor.target()).await
    }

    pub async fn reload(&self) -> ReloadResult {
        self.control.reload(&self.descriptor.target()).await
    }

    pub async fn status(&self) -> StatusReport {
        self.control.status(&self.descriptor.target()).await
    }

    /// Ensure the descriptor is current and the agent is registered.
    ///
    /// A rewritten descriptor triggers a reload; otherwise the agent is
    /// loaded only when launchd does not list it. Calling this on every
    /// launch never cycles an already current, running agent.
    pub async fn install_launch_agent(&self) -> Result<InstallOutcome, LaunchError> {
        let target = self.descriptor.target();

        if self.on_descriptor(installer::install).await? {
            info!("descriptor updated, reloading {}", target.label);
            let (error, output) = self.control.reload(&target).await.into_parts();
            return match error {
                Some(e) => {
                    warn!("reload of {} failed: {} ({})", target.label, e, output);
                    Err(e)
                }
                None => Ok(InstallOutcome::Reloaded),
            };
        }

        let report = self.control.status(&target).await;
        if let Some(e) = report.execution.error {
            return Err(e);
        }
        match report.state {
            Some(ServiceState::NotRunning) | None => {
                info!("{} not registered, loading", target.label);
                let (error, _) = self.control.load(&target).await.into_parts();
                match error {
                    Some(e) => Err(e),
                    None => Ok(InstallOutcome::Loaded),
                }
            }
            Some(state) => {
                info!("{} already registered ({:?})", target.label, state);
                Ok(InstallOutcome::AlreadyRunning)
            }
        }
    }

    /// Unload the agent and delete its descriptor. Returns whether a
    /// descriptor file was removed.
    pub async fn uninstall(&self) -> Result<bool, LaunchError> {
        let (error, output) = self.unload().await.into_parts();
        if let Some(e) = error {
            warn!("unload of {} failed: {}", self.descriptor.label, output);
            return Err(e);
        }
        self.on_descriptor(installer::remove).await
    }

    // Descriptor file I/O runs on the blocking pool, off the runtime workers
    async fn on_descriptor<T, F>(&self, op: F) -> Result<T, LaunchError>
    where
        T: Send + 'static,
        F: FnOnce(&ServiceDescriptor) -> Result<T, LaunchError> + Send + 'static,
    {
        let descriptor = self.descriptor.clone();
        tokio::task::spawn_blocking(move || op(&descriptor))
            .await
            .map_err(|e| LaunchError::Io {
                context: "descriptor task failed".to_string(),
                source: std::io::Error::other(e),
            })?
    }
}

// ── Completion-callback adapters ───────────────────────────────────────────

// Each adapter invokes its completion exactly once, on a runtime worker
fn spawn_with<Fut, F>(fut: Fut, completion: F) -> JoinHandle<()>
where
    Fut: Future<Output = (Option<LaunchError>, String)> + Send + 'static,
    F: FnOnce(Option<LaunchError>, String) + Send + 'static,
{
    tokio::spawn(async move {
        let (error, output) = fut.await;
        completion(error, output);
    })
}

impl LaunchController {
    /// Run `load` in the background and report through `completion`.
    pub fn spawn_load<F>(self: &Arc<Self>, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<LaunchError>, String) + Send + 'static,
    {
        let this = Arc::clone(self);
        spawn_with(async move { this.load().await.into_parts() }, completion)
    }

    pub fn spawn_unload<F>(self: &Arc<Self>, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<LaunchError>, String) + Send + 'static,
    {
        let this = Arc::clone(self);
        spawn_with(async move { this.unload().await.into_parts() }, completion)
    }

    pub fn spawn_reload<F>(self: &Arc<Self>, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<LaunchError>, String) + Send + 'static,
    {
        let this = Arc::clone(self);
        spawn_with(async move { this.reload().await.into_parts() }, completion)
    }

    pub fn spawn_status<F>(self: &Arc<Self>, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<LaunchError>, String) + Send + 'static,
    {
        let this = Arc::clone(self);
        spawn_with(
            async move { this.status().await.execution.into_parts() },
            completion,
        )
    }

    pub fn spawn_install_launch_agent<F>(self: &Arc<Self>, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<LaunchError>) + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            completion(this.install_launch_agent().await.err());
        })
    }
}
