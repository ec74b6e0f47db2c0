//! Linux adapters for the ENI attachment engine.
//!
//! Provides the rtnetlink-backed kernel networking adapter, the
//! namespace executor that runs work inside a container's network
//! namespace, and the device configuration executed there.

pub mod configure;
pub mod namespace;
pub mod netlink;

pub use configure::{LinkOps, IMDS_IPV4, IMDS_IPV6};
pub use namespace::{with_netns_path, NetnsExecutor};
pub use netlink::{NetlinkHandle, RtNetlink};
