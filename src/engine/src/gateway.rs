//! IPv6 default gateway discovery.
//!
//! The default route of a freshly attached ENI shows up in the kernel
//! route table only once router advertisements have been processed, so
//! the table is polled under the gateway policy until one appears.

use std::net::{IpAddr, Ipv6Addr};
use std::ops::ControlFlow;
use tracing::info;

use eni_core::{AddressFamily, EniError, HostError, Result};

use crate::retry::{retry, RetryError};
use crate::Engine;

impl Engine {
    /// Poll the IPv6 route table of `device_name` for a default gateway.
    pub async fn discover_ipv6_gateway(&self, device_name: &str) -> Result<Ipv6Addr> {
        const OP: &str = "discover_ipv6_gateway";
        let link = self
            .netlink
            .link_by_name(device_name)
            .await
            .map_err(|source| EniError::DeviceNotFound {
                op: OP,
                device: device_name.to_string(),
                source: Some(source),
            })?;

        let policy = self.config.gateway_poll;
        let netlink = &self.netlink;
        let link = &link;
        let outcome = retry(&policy, |tick| async move {
            let routes = netlink.route_list(link, AddressFamily::V6).await?;
            let gateway = routes.iter().find_map(|route| match route.default_gateway() {
                Some(IpAddr::V6(gateway)) => Some(gateway),
                _ => None,
            });
            match gateway {
                Some(gateway) => Ok::<_, HostError>(ControlFlow::Break(gateway)),
                None => {
                    info!(
                        device = %link.name,
                        attempt = tick,
                        max_attempts = policy.max_attempts,
                        "No IPv6 default route yet, polling"
                    );
                    Ok(ControlFlow::Continue(()))
                }
            }
        })
        .await;

        match outcome {
            Ok(gateway) => {
                info!(device = %device_name, gateway = %gateway, "Found IPv6 gateway");
                Ok(gateway)
            }
            Err(RetryError::Aborted(source)) => Err(EniError::MetadataUnavailable {
                op: OP,
                detail: format!("unable to list IPv6 routes of '{}'", device_name),
                source,
            }),
            Err(RetryError::Exhausted { attempts, .. }) => Err(EniError::GatewayNotFound {
                op: OP,
                device: device_name.to_string(),
                ticks: attempts,
            }),
        }
    }
}
