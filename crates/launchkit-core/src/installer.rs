//! Keeps the on-disk launch descriptor in sync with the bundled one.
//!
//! Only the descriptor file is touched here; a rewritten descriptor still
//! has to be reloaded through the service control client.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use launchkit_launchd::plist::LaunchdPlist;
use launchkit_platform::LaunchError;

use crate::descriptor::ServiceDescriptor;
use crate::version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    InstalledCurrent,
    InstalledStale,
}

/// Compare the descriptor on disk with `expected`.
///
/// A missing file is `NotInstalled`; an unreadable-as-plist file, one with
/// a different label, or one without a version token is `InstalledStale`.
/// Only genuine I/O failures (e.g. permissions) are errors.
pub fn inspect(expected: &ServiceDescriptor) -> Result<InstallState, LaunchError> {
    let path = &expected.descriptor_path;
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(InstallState::NotInstalled)
        }
        Err(e) => return Err(LaunchError::from_io("read", path, e)),
    };

    let existing = match std::str::from_utf8(&bytes)
        .map_err(|e| e.to_string())
        .and_then(|text| LaunchdPlist::parse(text).map_err(|e| e.to_string()))
    {
        Ok(existing) => existing,
        Err(e) => {
            warn!("corrupt descriptor at {}: {}", path.display(), e);
            return Ok(InstallState::InstalledStale);
        }
    };

    if existing.label != expected.label {
        warn!(
            "descriptor at {} has label {} (expected {})",
            path.display(),
            existing.label,
            expected.label
        );
        return Ok(InstallState::InstalledStale);
    }

    match existing.version() {
        Some(v) if !version::is_older(v, &expected.version) => {
            debug!("descriptor version {} is current (expected {})", v, expected.version);
            Ok(InstallState::InstalledCurrent)
        }
        Some(v) => {
            info!("descriptor version {} is older than {}", v, expected.version);
            Ok(InstallState::InstalledStale)
        }
        None => Ok(InstallState::InstalledStale),
    }
}

/// Write `expected` unless an equal-or-newer descriptor is already in place.
/// Returns whether the file was (re)written.
pub fn install(expected: &ServiceDescriptor) -> Result<bool, LaunchError> {
    let state = inspect(expected)?;
    if state == InstallState::InstalledCurrent {
        if content_drifted(expected) {
            warn!(
                "descriptor at {} differs from v{} but carries the same version; \
                 bump the version to apply the change",
                expected.descriptor_path.display(),
                expected.version
            );
        } else {
            info!(
                "launch descriptor up to date: {}",
                expected.descriptor_path.display()
            );
        }
        return Ok(false);
    }

    write_atomic(&expected.descriptor_path, expected.render().as_bytes())?;
    info!(
        "launch descriptor written ({:?}, v{}): {}",
        state,
        expected.version,
        expected.descriptor_path.display()
    );
    Ok(true)
}

/// Whether the descriptor on disk carries the same version as `expected`
/// but renders differently, e.g. after a config change without a bump.
pub fn content_drifted(expected: &ServiceDescriptor) -> bool {
    let Ok(text) = std::fs::read_to_string(&expected.descriptor_path) else {
        return false;
    };
    let same_version = LaunchdPlist::parse(&text)
        .ok()
        .and_then(|existing| {
            existing
                .version()
                .map(|v| version::compare_versions(v, &expected.version).is_eq())
        })
        .unwrap_or(false);
    same_version && text != expected.render()
}

/// Delete the descriptor file. Returns whether a file was removed.
pub fn remove(descriptor: &ServiceDescriptor) -> Result<bool, LaunchError> {
    let path = &descriptor.descriptor_path;
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("launch descriptor removed: {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LaunchError::from_io("remove", path, e)),
    }
}

/// Write to a sibling temp file, then rename over `path`, so launchd never
/// observes a half-written descriptor.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), LaunchError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| LaunchError::from_io("create", dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| LaunchError::from_io("create temp file in", dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| LaunchError::from_io("write", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| LaunchError::from_io("write", path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchConfig;
    use crate::descriptor::BuildMode;
    use crate::resolver;

    fn descriptor(home: &Path, version: &str) -> ServiceDescriptor {
        resolver::resolve(&LaunchConfig::default(), home, BuildMode::Release, version)
    }

    #[test]
    fn test_missing_descriptor_is_not_installed() {
        let home = tempfile::tempdir().unwrap();
        let d = descriptor(home.path(), "1.0");
        assert_eq!(inspect(&d).unwrap(), InstallState::NotInstalled);
    }

    #[test]
    fn test_install_twice_writes_once() {
        let home = tempfile::tempdir().unwrap();
        let d = descriptor(home.path(), "1.0");

        assert!(install(&d).unwrap());
        let written = std::fs::read_to_string(&d.descriptor_path).unwrap();
        assert_eq!(written, d.render());
        let modified = std::fs::metadata(&d.descriptor_path).unwrap().modified().unwrap();

        assert!(!install(&d).unwrap());
        assert_eq!(inspect(&d).unwrap(), InstallState::InstalledCurrent);
        assert_eq!(
            std::fs::metadata(&d.descriptor_path).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn test_older_version_is_overwritten() {
        let home = tempfile::tempdir().unwrap();
        let old = descriptor(home.path(), "1.0");
        let new = descriptor(home.path(), "1.1");

        assert!(install(&old).unwrap());
        assert_eq!(inspect(&new).unwrap(), InstallState::InstalledStale);
        assert!(install(&new).unwrap());

        let on_disk = LaunchdPlist::parse(&std::fs::read_to_string(&new.descriptor_path).unwrap())
            .unwrap();
        assert_eq!(on_disk.version(), Some("1.1"));
    }

    #[test]
    fn test_prerelease_is_replaced_by_release() {
        let home = tempfile::tempdir().unwrap();
        let beta = descriptor(home.path(), "1.2.0-beta.1");
        let release = descriptor(home.path(), "1.2.0");

        assert!(install(&beta).unwrap());
        assert_eq!(inspect(&release).unwrap(), InstallState::InstalledStale);
        assert!(install(&release).unwrap());

        let on_disk =
            LaunchdPlist::parse(&std::fs::read_to_string(&release.descriptor_path).unwrap())
                .unwrap();
        assert_eq!(on_disk.version(), Some("1.2.0"));
        assert!(!install(&beta).unwrap());
    }

    #[test]
    fn test_same_version_with_new_arguments_is_not_rewritten() {
        let home = tempfile::tempdir().unwrap();
        let d = descriptor(home.path(), "1.0");
        assert!(install(&d).unwrap());
        assert!(!content_drifted(&d));

        let mut changed = d.clone();
        changed.arguments.push("--verbose".to_string());
        assert!(content_drifted(&changed));
        assert!(!install(&changed).unwrap());
        assert_eq!(std::fs::read_to_string(&d.descriptor_path).unwrap(), d.render());

        // A newer descriptor on disk is not drift
        let older = descriptor(home.path(), "0.9");
        assert!(!content_drifted(&older));
    }

    #[test]
    fn test_newer_version_is_left_alone() {
        let home = tempfile::tempdir().unwrap();
        let newer = descriptor(home.path(), "2.0");
        let older = descriptor(home.path(), "1.9");

        assert!(install(&newer).unwrap());
        assert!(!install(&older).unwrap());
        let on_disk = std::fs::read_to_string(&older.descriptor_path).unwrap();
        assert!(on_disk.contains("<string>2.0</string>"));
    }

    #[test]
    fn test_corrupt_descriptor_self_heals() {
        let home = tempfile::tempdir().unwrap();
        let d = descriptor(home.path(), "1.0");
        std::fs::create_dir_all(d.descriptor_path.parent().unwrap()).unwrap();
        std::fs::write(&d.descriptor_path, b"<plist><dict><key>Lab").unwrap();

        assert_eq!(inspect(&d).unwrap(), InstallState::InstalledStale);
        assert!(install(&d).unwrap());
        assert_eq!(inspect(&d).unwrap(), InstallState::InstalledCurrent);
    }

    #[test]
    fn test_binary_garbage_is_stale() {
        let home = tempfile::tempdir().unwrap();
        let d = descriptor(home.path(), "1.0");
        std::fs::create_dir_all(d.descriptor_path.parent().unwrap()).unwrap();
        std::fs::write(&d.descriptor_path, [0xff, 0xfe, 0x00, 0x01]).unwrap();

        assert_eq!(inspect(&d).unwrap(), InstallState::InstalledStale);
    }

    #[test]
    fn test_foreign_label_is_stale() {
        let home = tempfile::tempdir().unwrap();
        let d = descriptor(home.path(), "1.0");
        let mut other = d.clone();
        other.label = "com.someone.else".to_string();
        assert!(install(&other).unwrap());

        assert_eq!(inspect(&d).unwrap(), InstallState::InstalledStale);
    }

    #[test]
    fn test_write_failure_is_surfaced() {
        let home = tempfile::tempdir().unwrap();
        // A regular file where the LaunchAgents directory should be
        std::fs::create_dir_all(home.path().join("Library")).unwrap();
        std::fs::write(home.path().join("Library").join("LaunchAgents"), b"").unwrap();

        let d = descriptor(home.path(), "1.0");
        assert!(install(&d).is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let home = tempfile::tempdir().unwrap();
        let d = descriptor(home.path(), "1.0");
        install(&d).unwrap();

        assert!(remove(&d).unwrap());
        assert!(!remove(&d).unwrap());
        assert_eq!(inspect(&d).unwrap(), InstallState::NotInstalled);
    }
}
