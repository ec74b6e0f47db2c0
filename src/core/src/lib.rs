//! ENI Core - Foundational Types and Abstractions
//!
//! Error taxonomy, engine configuration, the network data model, and the
//! host collaborator traits shared by the ENI attachment engine and its
//! Linux adapters.

pub mod config;
pub mod error;
pub mod host;
pub mod log;
pub mod network;

// Re-export commonly used types
pub use config::{EngineConfig, ImdsConfig, RetryPolicy};
pub use error::{EniError, ErrorKind, HostError, Result};
pub use host::{MetadataClient, NamespaceHandle, NetLink, NetNs};
pub use network::{
    AddressFamily, InterfaceDescriptor, Ipv4Subnet, LinkRecord, MacAddress, NamespaceConfiguration,
    NamespaceTask, RouteRecord, SetupRequest, TeardownConfiguration,
};

/// ENI Core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
