// launchd (macOS per-user service manager) implementations

pub mod classify;
pub mod launchctl;
pub mod plist;
pub mod runner;
