//! Install, update and control the agent's per-user launch descriptor.

pub mod config;
pub mod controller;
pub mod descriptor;
pub mod installer;
pub mod resolver;
pub mod version;

pub use config::LaunchConfig;
pub use controller::{InstallOutcome, LaunchController};
pub use descriptor::{BuildMode, ServiceDescriptor};
pub use installer::InstallState;
