//! rtnetlink-backed kernel networking.
//!
//! Each [`NetlinkHandle`] owns its own netlink socket. The socket is bound
//! to the network namespace of the thread that created it, which is how
//! the in-namespace configuration reaches the container's links.

use async_trait::async_trait;
use futures::TryStreamExt;
use ipnet::IpNet;
use rtnetlink::packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::packet_route::route::{RouteAddress, RouteAttribute, RouteMessage, RouteType};
use rtnetlink::{Handle, LinkUnspec, RouteMessageBuilder};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::AsRawFd;

use eni_core::{
    AddressFamily, HostError, LinkRecord, MacAddress, NamespaceHandle, NetLink, RouteRecord,
};

use crate::configure::LinkOps;

/// A netlink route socket and its request handle.
pub struct NetlinkHandle {
    handle: Handle,
}

impl NetlinkHandle {
    /// Open a netlink socket in the current thread's network namespace.
    ///
    /// Must be called from within a tokio runtime, which drives the
    /// socket's connection task.
    pub fn connect() -> Result<Self, HostError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| HostError::Netlink("tokio runtime is not running".to_string()))?;
        let (connection, handle, _) = rtnetlink::new_connection()?;
        runtime.spawn(connection);
        Ok(Self { handle })
    }

    pub async fn links(&self) -> Result<Vec<LinkRecord>, HostError> {
        let mut stream = self.handle.link().get().execute();
        let mut links = Vec::new();
        while let Some(msg) = stream
            .try_next()
            .await
            .map_err(|e| netlink_error("list links", e))?
        {
            links.push(link_record(&msg));
        }
        Ok(links)
    }

    pub async fn link_by_name(&self, name: &str) -> Result<LinkRecord, HostError> {
        let mut stream = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match stream
            .try_next()
            .await
            .map_err(|e| netlink_error(&format!("get link '{}'", name), e))?
        {
            Some(msg) => Ok(link_record(&msg)),
            None => Err(HostError::Netlink(format!("link '{}' not found", name))),
        }
    }

    pub async fn set_link(&self, message: LinkMessage, what: &str) -> Result<(), HostError> {
        self.handle
            .link()
            .set(message)
            .execute()
            .await
            .map_err(|e| netlink_error(what, e))
    }

    pub async fn routes(
        &self,
        link_index: u32,
        family: AddressFamily,
    ) -> Result<Vec<RouteRecord>, HostError> {
        let filter = match family {
            AddressFamily::V4 => RouteMessageBuilder::<Ipv4Addr>::default()
                .output_interface(link_index)
                .build(),
            AddressFamily::V6 => RouteMessageBuilder::<Ipv6Addr>::default()
                .output_interface(link_index)
                .build(),
        };

        let mut stream = self.handle.route().get(filter).execute();
        let mut routes = Vec::new();
        while let Some(msg) = stream
            .try_next()
            .await
            .map_err(|e| netlink_error(&format!("list {} routes", family), e))?
        {
            let route = route_record(&msg);
            // Dumps are not filtered by the kernel unless strict checking is on
            if route.link_index == link_index {
                routes.push(route);
            }
        }
        Ok(routes)
    }

    async fn add_route(&self, message: RouteMessage, what: &str) -> Result<(), HostError> {
        self.handle
            .route()
            .add(message)
            .execute()
            .await
            .map_err(|e| netlink_error(what, e))
    }
}

#[async_trait]
impl LinkOps for NetlinkHandle {
    async fn links(&self) -> Result<Vec<LinkRecord>, HostError> {
        NetlinkHandle::links(self).await
    }

    async fn link_by_name(&self, name: &str) -> Result<LinkRecord, HostError> {
        NetlinkHandle::link_by_name(self, name).await
    }

    async fn rename(&self, link: &LinkRecord, name: &str) -> Result<(), HostError> {
        let message = LinkUnspec::new_with_index(link.index)
            .name(name.to_string())
            .build();
        self.set_link(message, &format!("rename '{}' to '{}'", link.name, name))
            .await
    }

    async fn set_up(&self, link: &LinkRecord) -> Result<(), HostError> {
        let message = LinkUnspec::new_with_index(link.index).up().build();
        self.set_link(message, &format!("set '{}' up", link.name)).await
    }

    async fn set_down(&self, link: &LinkRecord) -> Result<(), HostError> {
        let message = LinkUnspec::new_with_index(link.index).down().build();
        self.set_link(message, &format!("set '{}' down", link.name)).await
    }

    async fn add_address(&self, link: &LinkRecord, address: IpNet) -> Result<(), HostError> {
        self.handle
            .address()
            .add(link.index, address.addr(), address.prefix_len())
            .execute()
            .await
            .map_err(|e| netlink_error(&format!("add address {} to '{}'", address, link.name), e))
    }

    async fn add_default_route(&self, link: &LinkRecord, gateway: IpAddr) -> Result<(), HostError> {
        let message = match gateway {
            IpAddr::V4(gw) => RouteMessageBuilder::<Ipv4Addr>::default()
                .output_interface(link.index)
                .gateway(gw)
                .build(),
            IpAddr::V6(gw) => RouteMessageBuilder::<Ipv6Addr>::default()
                .output_interface(link.index)
                .gateway(gw)
                .build(),
        };
        self.add_route(
            message,
            &format!("add default route via {} on '{}'", gateway, link.name),
        )
        .await
    }

    async fn add_blackhole_route(&self, destination: IpNet) -> Result<(), HostError> {
        let mut message = match destination {
            IpNet::V4(net) => RouteMessageBuilder::<Ipv4Addr>::default()
                .destination_prefix(net.addr(), net.prefix_len())
                .build(),
            IpNet::V6(net) => RouteMessageBuilder::<Ipv6Addr>::default()
                .destination_prefix(net.addr(), net.prefix_len())
                .build(),
        };
        message.header.kind = RouteType::BlackHole;
        self.add_route(message, &format!("add blackhole route {}", destination))
            .await
    }
}

/// Kernel networking in the calling thread's namespace.
///
/// Every call opens a short-lived netlink socket, so the adapter holds no
/// state between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtNetlink;

impl RtNetlink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetLink for RtNetlink {
    async fn link_list(&self) -> Result<Vec<LinkRecord>, HostError> {
        NetlinkHandle::connect()?.links().await
    }

    async fn link_by_name(&self, name: &str) -> Result<LinkRecord, HostError> {
        NetlinkHandle::connect()?.link_by_name(name).await
    }

    async fn link_set_ns(&self, link: &LinkRecord, ns: &NamespaceHandle) -> Result<(), HostError> {
        let message = LinkUnspec::new_with_index(link.index)
            .setns_by_fd(ns.as_raw_fd())
            .build();
        NetlinkHandle::connect()?
            .set_link(
                message,
                &format!(
                    "move '{}' to namespace {}",
                    link.name,
                    ns.path().display()
                ),
            )
            .await
    }

    async fn route_list(
        &self,
        link: &LinkRecord,
        family: AddressFamily,
    ) -> Result<Vec<RouteRecord>, HostError> {
        NetlinkHandle::connect()?.routes(link.index, family).await
    }
}

fn netlink_error(what: &str, err: rtnetlink::Error) -> HostError {
    HostError::Netlink(format!("{}: {}", what, err))
}

fn link_record(msg: &LinkMessage) -> LinkRecord {
    let mut name = String::new();
    let mut hardware_addr = None;
    for attr in &msg.attributes {
        match attr {
            LinkAttribute::IfName(n) => name = n.clone(),
            LinkAttribute::Address(bytes) => hardware_addr = MacAddress::from_bytes(bytes),
            _ => {}
        }
    }
    LinkRecord {
        index: msg.header.index,
        name,
        hardware_addr,
    }
}

fn route_ip(addr: &RouteAddress) -> Option<IpAddr> {
    match addr {
        RouteAddress::Inet(v4) => Some(IpAddr::V4(*v4)),
        RouteAddress::Inet6(v6) => Some(IpAddr::V6(*v6)),
        _ => None,
    }
}

/// Reduce a kernel route message to a [`RouteRecord`].
///
/// A zero-length destination prefix is reported as no destination, the
/// same as an absent `RTA_DST`.
fn route_record(msg: &RouteMessage) -> RouteRecord {
    let mut record = RouteRecord::default();
    let dst_len = msg.header.destination_prefix_length;
    for attr in &msg.attributes {
        match attr {
            RouteAttribute::Destination(addr) if dst_len > 0 => {
                record.destination = route_ip(addr).and_then(|ip| IpNet::new(ip, dst_len).ok());
            }
            RouteAttribute::Source(addr) | RouteAttribute::PrefSource(addr) => {
                record.source = route_ip(addr);
            }
            RouteAttribute::Gateway(addr) => record.gateway = route_ip(addr),
            RouteAttribute::Oif(index) => record.link_index = *index,
            _ => {}
        }
    }
    record
}
