//! ENI attachment engine.
//!
//! Discovers an attached ENI's addressing from instance metadata, locates
//! its kernel device, polls for its IPv6 default gateway, and moves the
//! device into a container's network namespace for configuration.

mod device;
mod engine;
mod gateway;
pub mod imds;
mod metadata;
mod orchestrator;
pub mod retry;

#[cfg(test)]
mod testing;

pub use engine::Engine;
pub use imds::ImdsClient;
pub use metadata::MACS_PATH;
pub use retry::{retry, RetryError};

/// ENI engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
