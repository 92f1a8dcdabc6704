// Host-neutral seams shared by the launchd backend and the controller

pub mod command;
pub mod error;
pub mod service;

pub use error::LaunchError;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
