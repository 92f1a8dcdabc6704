//! End-to-end lifecycle against an in-memory launchd that tracks which
//! labels are loaded.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use launchkit_core::{resolver, BuildMode, InstallOutcome, LaunchConfig, LaunchController};
use launchkit_launchd::launchctl::LaunchctlClient;
use launchkit_launchd::plist::LaunchdPlist;
use launchkit_platform::command::{CommandOutput, CommandRunner};
use launchkit_platform::service::{BenignKind, ServiceState};
use launchkit_platform::LaunchError;

#[derive(Default)]
struct SimulatedLaunchd {
    /// label -> pid
    loaded: Mutex<BTreeMap<String, u32>>,
    log: Mutex<Vec<String>>,
}

impl SimulatedLaunchd {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn label_at(path: &str) -> Option<String> {
        let text = std::fs::read_to_string(path).ok()?;
        LaunchdPlist::parse(&text).ok().map(|p| p.label)
    }
}

#[async_trait]
impl CommandRunner for SimulatedLaunchd {
    async fn run(
        &self,
        _program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput, LaunchError> {
        self.log.lock().unwrap().push(args.join(" "));
        let mut loaded = self.loaded.lock().unwrap();

        let reply = match args.first().map(String::as_str) {
            Some("load") => match Self::label_at(&args[2]) {
                None => CommandOutput::new(Some(0), format!("{}: No such file or directory", args[2])),
                Some(label) if loaded.contains_key(&label) => {
                    CommandOutput::new(Some(0), format!("{}: service already loaded", args[2]))
                }
                Some(label) => {
                    let pid = 1000 + loaded.len() as u32;
                    loaded.insert(label, pid);
                    CommandOutput::new(Some(0), "")
                }
            },
            Some("unload") => match Self::label_at(&args[1]) {
                Some(label) if loaded.remove(&label).is_some() => CommandOutput::new(Some(0), ""),
                _ => CommandOutput::new(Some(0), "Could not find specified service"),
            },
            Some("remove") => {
                if loaded.remove(&args[1]).is_some() {
                    CommandOutput::new(Some(0), "")
                } else {
                    CommandOutput::new(Some(113), "")
                }
            }
            Some("list") => {
                let mut out = String::from("PID\tStatus\tLabel\n");
                for (label, pid) in loaded.iter() {
                    out.push_str(&format!("{}\t0\t{}\n", pid, label));
                }
                CommandOutput::new(Some(0), out)
            }
            _ => CommandOutput::new(Some(64), "Unrecognized subcommand"),
        };
        Ok(reply)
    }
}

fn controller(
    home: &Path,
    launchd: &Arc<SimulatedLaunchd>,
    mode: BuildMode,
    version: &str,
) -> LaunchController {
    let descriptor = resolver::resolve(&LaunchConfig::default(), home, mode, version);
    let client = LaunchctlClient::new(launchd.clone() as Arc<dyn CommandRunner>);
    LaunchController::new(Arc::new(client), descriptor)
}

#[tokio::test]
async fn startup_twice_does_not_cycle_the_agent() {
    let home = tempfile::tempdir().unwrap();
    let launchd = Arc::new(SimulatedLaunchd::default());
    let c = controller(home.path(), &launchd, BuildMode::Release, "1.0");

    assert_eq!(c.install_launch_agent().await.unwrap(), InstallOutcome::Reloaded);
    let after_first = launchd.log().len();

    assert_eq!(
        c.install_launch_agent().await.unwrap(),
        InstallOutcome::AlreadyRunning
    );
    let second: Vec<String> = launchd.log()[after_first..].to_vec();
    assert_eq!(second, vec!["list".to_string()]);
}

#[tokio::test]
async fn upgrade_replaces_descriptor_and_restarts() {
    let home = tempfile::tempdir().unwrap();
    let launchd = Arc::new(SimulatedLaunchd::default());

    controller(home.path(), &launchd, BuildMode::Release, "1.0")
        .install_launch_agent()
        .await
        .unwrap();

    let upgraded = controller(home.path(), &launchd, BuildMode::Release, "1.1");
    assert_eq!(
        upgraded.install_launch_agent().await.unwrap(),
        InstallOutcome::Reloaded
    );

    let text = std::fs::read_to_string(&upgraded.descriptor().descriptor_path).unwrap();
    assert_eq!(LaunchdPlist::parse(&text).unwrap().version(), Some("1.1"));

    let log = launchd.log();
    let unload = log.iter().rposition(|l| l.starts_with("unload")).unwrap();
    let load = log.iter().rposition(|l| l.starts_with("load")).unwrap();
    assert!(unload < load);

    let status = upgraded.status().await;
    assert!(matches!(status.state, Some(ServiceState::Running { pid: Some(_) })));
}

#[tokio::test]
async fn repeated_load_and_unload_are_quiet() {
    let home = tempfile::tempdir().unwrap();
    let launchd = Arc::new(SimulatedLaunchd::default());
    let c = controller(home.path(), &launchd, BuildMode::Release, "1.0");
    launchkit_core::installer::install(c.descriptor()).unwrap();

    assert!(c.load().await.is_success());
    let again = c.load().await;
    assert!(again.is_success());
    assert_eq!(again.warning, Some(BenignKind::AlreadyLoaded));

    assert!(c.unload().await.is_success());
    let again = c.unload().await;
    assert!(again.is_success());
    assert_eq!(again.warning, Some(BenignKind::NotLoaded));

    assert_eq!(c.status().await.state, Some(ServiceState::NotRunning));
}

#[tokio::test]
async fn release_and_development_agents_coexist() {
    let home = tempfile::tempdir().unwrap();
    let launchd = Arc::new(SimulatedLaunchd::default());
    let release = controller(home.path(), &launchd, BuildMode::Release, "1.0");
    let devel = controller(home.path(), &launchd, BuildMode::Development, "1.0");

    release.install_launch_agent().await.unwrap();
    devel.install_launch_agent().await.unwrap();

    let listing = release.status().await.execution.output;
    assert!(listing.contains("com.launchkit.agent\n"));
    assert!(listing.contains("com.launchkit.agent.devel"));
}

#[tokio::test]
async fn uninstall_then_reinstall() {
    let home = tempfile::tempdir().unwrap();
    let launchd = Arc::new(SimulatedLaunchd::default());
    let c = controller(home.path(), &launchd, BuildMode::Release, "1.0");

    c.install_launch_agent().await.unwrap();
    assert!(c.uninstall().await.unwrap());
    assert_eq!(c.status().await.state, Some(ServiceState::NotRunning));

    assert_eq!(c.install_launch_agent().await.unwrap(), InstallOutcome::Reloaded);
    assert!(matches!(
        c.status().await.state,
        Some(ServiceState::Running { .. })
    ));
}
