//! ENI discovery from instance metadata.

use ipnet::{Ipv4Net, Ipv6Net};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::ControlFlow;
use std::str::FromStr;
use tracing::{debug, info, warn};

use eni_core::network::{ipv4_gateway_and_netmask, ipv6_prefix_length};
use eni_core::{
    AddressFamily, EniError, HostError, InterfaceDescriptor, Ipv4Subnet, MacAddress, Result,
};

use crate::retry::{retry, RetryError};
use crate::Engine;

/// Enumerates the MACs of attached interfaces, one `<mac>/` per line.
pub const MACS_PATH: &str = "network/interfaces/macs/";

const INTERFACE_ID_SUFFIX: &str = "interface-id";
const IPV4_CIDR_SUFFIX: &str = "/subnet-ipv4-cidr-block";
const IPV4_ADDRESSES_SUFFIX: &str = "/local-ipv4s";
const IPV6_ADDRESSES_SUFFIX: &str = "/ipv6s";
const IPV6_CIDR_SUFFIX: &str = "/subnet-ipv6-cidr-blocks";

fn mac_path(mac: &str, suffix: &str) -> String {
    format!("{}{}{}", MACS_PATH, mac, suffix)
}

/// Non-empty trimmed lines of a metadata response.
fn split_lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_lines<T>(op: &'static str, body: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    split_lines(body)
        .into_iter()
        .map(|line| {
            line.parse().map_err(|e: T::Err| EniError::Parse {
                op,
                input: line.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl Engine {
    async fn fetch(&self, op: &'static str, path: &str) -> Result<String> {
        self.metadata
            .get_metadata(path)
            .await
            .map_err(|source| EniError::MetadataUnavailable {
                op,
                detail: format!("unable to get metadata '{}'", path),
                source,
            })
    }

    /// MACs of every interface attached to the instance, in metadata order.
    pub async fn list_mac_addresses(&self) -> Result<Vec<String>> {
        let body = self.fetch("list_mac_addresses", MACS_PATH).await?;
        Ok(split_lines(&body))
    }

    /// Find the MAC whose interface id is `eni_id`.
    ///
    /// Candidates are tried in order; a candidate whose query fails is
    /// skipped. The returned MAC has no trailing `/`.
    pub async fn resolve_eni_to_mac(&self, macs: &[String], eni_id: &str) -> Result<String> {
        for candidate in macs {
            let path = mac_path(&format!("{}/", candidate.trim_end_matches('/')), INTERFACE_ID_SUFFIX);
            match self.metadata.get_metadata(&path).await {
                Ok(id) if id.trim() == eni_id => {
                    let mac = candidate.trim_end_matches('/').to_string();
                    info!(eni_id = %eni_id, mac = %mac, "Resolved ENI to MAC address");
                    return Ok(mac);
                }
                Ok(id) => {
                    debug!(mac = %candidate, interface_id = %id.trim(), "MAC belongs to another ENI");
                }
                Err(e) => {
                    warn!(mac = %candidate, error = %e, "Skipping MAC, unable to get interface id");
                }
            }
        }

        Err(EniError::UnmappedMacAddress {
            op: "resolve_eni_to_mac",
            eni_id: eni_id.to_string(),
        })
    }

    /// Gateway (network + 1) and prefix length of the ENI's IPv4 subnet.
    pub async fn resolve_ipv4_gateway_and_netmask(&self, mac: &str) -> Result<Ipv4Subnet> {
        const OP: &str = "resolve_ipv4_gateway_and_netmask";
        let body = self.fetch(OP, &mac_path(mac, IPV4_CIDR_SUFFIX)).await?;
        ipv4_gateway_and_netmask(&body).map_err(|reason| EniError::Parse {
            op: OP,
            input: body.trim().to_string(),
            reason,
        })
    }

    /// Prefix length of the ENI's first IPv6 subnet block.
    pub async fn resolve_ipv6_prefix_length(&self, mac: &str) -> Result<u8> {
        const OP: &str = "resolve_ipv6_prefix_length";
        let body = self.fetch(OP, &mac_path(mac, IPV6_CIDR_SUFFIX)).await?;
        let first = split_lines(&body).into_iter().next().unwrap_or_default();
        ipv6_prefix_length(&first).map_err(|reason| EniError::Parse {
            op: OP,
            input: first,
            reason,
        })
    }

    /// Whether `address` is one of the ENI's secondary addresses.
    ///
    /// Secondary addresses can show up in metadata some time after the
    /// ENI is attached, so failed queries are retried under the
    /// metadata retry policy.
    pub async fn matches_secondary_address(&self, mac: &str, address: IpAddr) -> Result<bool> {
        const OP: &str = "matches_secondary_address";
        let family = AddressFamily::of(&address);
        let suffix = match family {
            AddressFamily::V4 => IPV4_ADDRESSES_SUFFIX,
            AddressFamily::V6 => IPV6_ADDRESSES_SUFFIX,
        };
        let path = mac_path(mac, suffix);
        let policy = self.config.metadata_retry;

        let metadata = &self.metadata;
        let path_ref = path.as_str();
        let outcome = retry(&policy, |attempt| async move {
            match metadata.get_metadata(path_ref).await {
                Ok(body) => Ok::<_, Infallible>(ControlFlow::Break(body)),
                Err(e) => {
                    warn!(
                        path = %path_ref,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Unable to get secondary addresses, retrying"
                    );
                    Ok(ControlFlow::Continue(e))
                }
            }
        })
        .await;

        let body = match outcome {
            Ok(body) => body,
            Err(RetryError::Aborted(never)) => match never {},
            Err(RetryError::Exhausted { attempts, last }) => {
                return Err(EniError::MetadataUnavailable {
                    op: OP,
                    detail: format!(
                        "unable to get {} addresses from '{}' after {} attempts",
                        family, path, attempts
                    ),
                    source: last,
                });
            }
        };

        let found = split_lines(&body).iter().any(|line| match line.parse::<IpAddr>() {
            Ok(entry) => entry == address,
            Err(e) => {
                debug!(path = %path, entry = %line, error = %e, "Ignoring unparsable address entry");
                false
            }
        });
        Ok(found)
    }

    pub async fn mac_maps_to_ipv4(&self, mac: &str, address: Ipv4Addr) -> Result<bool> {
        self.matches_secondary_address(mac, IpAddr::V4(address)).await
    }

    pub async fn mac_maps_to_ipv6(&self, mac: &str, address: Ipv6Addr) -> Result<bool> {
        self.matches_secondary_address(mac, IpAddr::V6(address)).await
    }

    /// Assemble everything instance metadata knows about an ENI.
    pub async fn describe_eni(&self, eni_id: &str) -> Result<InterfaceDescriptor> {
        const OP: &str = "describe_eni";
        let macs = self.list_mac_addresses().await?;
        let mac = self.resolve_eni_to_mac(&macs, eni_id).await?;
        let mac_address: MacAddress = mac.parse().map_err(|_| EniError::MalformedAddress {
            op: OP,
            mac: mac.clone(),
        })?;
        let device_name = self.device_name_for_mac(&mac).await?;

        let cidr_body = self.fetch(OP, &mac_path(&mac, IPV4_CIDR_SUFFIX)).await?;
        let ipv4_cidr: Ipv4Net = cidr_body.trim().parse().map_err(|e: ipnet::AddrParseError| {
            EniError::Parse {
                op: OP,
                input: cidr_body.trim().to_string(),
                reason: e.to_string(),
            }
        })?;

        let ipv4_body = self.fetch(OP, &mac_path(&mac, IPV4_ADDRESSES_SUFFIX)).await?;
        let ipv4_addresses: BTreeSet<Ipv4Addr> = parse_lines::<Ipv4Addr>(OP, &ipv4_body)?.into_iter().collect();

        let ipv6_addresses: BTreeSet<Ipv6Addr> = match self.optional(OP, &mac, IPV6_ADDRESSES_SUFFIX).await? {
            Some(body) => parse_lines::<Ipv6Addr>(OP, &body)?.into_iter().collect(),
            None => BTreeSet::new(),
        };
        let ipv6_cidrs: Vec<Ipv6Net> = match self.optional(OP, &mac, IPV6_CIDR_SUFFIX).await? {
            Some(body) => parse_lines(OP, &body)?,
            None => Vec::new(),
        };

        Ok(InterfaceDescriptor {
            mac_address,
            eni_id: eni_id.to_string(),
            device_name,
            ipv4_addresses,
            ipv4_cidr,
            ipv6_addresses,
            ipv6_cidrs,
        })
    }

    /// Fetch a path that may legitimately be missing: IPv6 paths answer
    /// 404 for IPv4-only ENIs. Any other failure is an error.
    async fn optional(&self, op: &'static str, mac: &str, suffix: &str) -> Result<Option<String>> {
        let path = mac_path(mac, suffix);
        match self.metadata.get_metadata(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(HostError::NotFound(_)) => {
                debug!(path = %path, "Metadata path not present");
                Ok(None)
            }
            Err(source) => Err(EniError::MetadataUnavailable {
                op,
                detail: format!("unable to get metadata '{}'", path),
                source,
            }),
        }
    }
}
