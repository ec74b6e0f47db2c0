//! Device configuration executed inside the container's network namespace.
//!
//! Setup:
//! 1. Finds the moved device by its host-side name
//! 2. Renames it to the requested interface name
//! 3. Assigns the IPv4 (and optional IPv6) address
//! 4. Brings the link up
//! 5. Adds default routes via the subnet gateways
//! 6. Optionally blackholes the instance metadata endpoints
//!
//! Teardown brings the device down. A device that is already gone is not
//! an error, so teardown can be repeated safely.

use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, info};

use eni_core::{HostError, LinkRecord, NamespaceConfiguration, NamespaceTask, TeardownConfiguration};

use crate::netlink::NetlinkHandle;

/// IPv4 instance metadata endpoint.
pub const IMDS_IPV4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// IPv6 instance metadata endpoint (fd00:ec2::254).
pub const IMDS_IPV6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0xec2, 0, 0, 0, 0, 0, 0x254);

/// Link operations needed by the in-namespace configuration.
#[async_trait]
pub trait LinkOps: Send + Sync {
    async fn links(&self) -> Result<Vec<LinkRecord>, HostError>;
    async fn link_by_name(&self, name: &str) -> Result<LinkRecord, HostError>;
    async fn rename(&self, link: &LinkRecord, name: &str) -> Result<(), HostError>;
    async fn set_up(&self, link: &LinkRecord) -> Result<(), HostError>;
    async fn set_down(&self, link: &LinkRecord) -> Result<(), HostError>;
    async fn add_address(&self, link: &LinkRecord, address: IpNet) -> Result<(), HostError>;
    async fn add_default_route(&self, link: &LinkRecord, gateway: IpAddr) -> Result<(), HostError>;
    async fn add_blackhole_route(&self, destination: IpNet) -> Result<(), HostError>;
}

/// Run a namespace task against a netlink socket opened in the current
/// thread's namespace.
pub async fn execute(task: NamespaceTask) -> Result<(), HostError> {
    let netlink = NetlinkHandle::connect()?;
    match task {
        NamespaceTask::Setup(config) => setup(&netlink, &config).await,
        NamespaceTask::Teardown(config) => teardown(&netlink, &config).await,
    }
}

/// Configure the moved device.
pub async fn setup<L: LinkOps + ?Sized>(
    ops: &L,
    config: &NamespaceConfiguration,
) -> Result<(), HostError> {
    let mut link = ops.link_by_name(&config.device_name).await?;

    if link.name != config.if_name {
        info!(device = %config.device_name, if_name = %config.if_name, "Renaming device");
        ops.rename(&link, &config.if_name).await?;
        link.name = config.if_name.clone();
    }

    info!(ip = %config.ipv4_address, if_name = %link.name, "Assigning IPv4 address");
    ops.add_address(&link, IpNet::V4(config.ipv4_address)).await?;

    if let Some(ipv6) = config.ipv6_address {
        info!(ip = %ipv6, if_name = %link.name, "Assigning IPv6 address");
        ops.add_address(&link, IpNet::V6(ipv6)).await?;
    }

    ops.set_up(&link).await?;

    info!(gateway = %config.ipv4_gateway, "Adding IPv4 default route");
    ops.add_default_route(&link, IpAddr::V4(config.ipv4_gateway))
        .await?;

    if let Some(gateway) = config.ipv6_gateway {
        info!(gateway = %gateway, "Adding IPv6 default route");
        ops.add_default_route(&link, IpAddr::V6(gateway)).await?;
    }

    if config.block_imds {
        for destination in imds_destinations() {
            debug!(destination = %destination, "Blocking instance metadata endpoint");
            ops.add_blackhole_route(destination).await?;
        }
    }

    info!(if_name = %link.name, mac = %config.mac_address, "Container interface configured");
    Ok(())
}

/// Bring down the device carrying the given MAC, if it is still present.
pub async fn teardown<L: LinkOps + ?Sized>(
    ops: &L,
    config: &TeardownConfiguration,
) -> Result<(), HostError> {
    let links = ops.links().await?;
    let link = match links
        .into_iter()
        .find(|l| l.hardware_addr == Some(config.mac_address))
    {
        Some(link) => link,
        None => {
            info!(mac = %config.mac_address, "Device not found in namespace, nothing to tear down");
            return Ok(());
        }
    };

    info!(device = %link.name, mac = %config.mac_address, "Bringing device down");
    ops.set_down(&link).await
}

fn imds_destinations() -> [IpNet; 2] {
    [
        IpNet::V4(Ipv4Net::from(IMDS_IPV4)),
        IpNet::V6(Ipv6Net::from(IMDS_IPV6)),
    ]
}
