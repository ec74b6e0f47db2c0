//! Network types for ENI discovery and namespace configuration.
//!
//! Provides hardware addresses, the kernel link and route views the engine
//! reasons about, the per-call interface descriptor assembled from instance
//! metadata, and the configuration values executed inside a container's
//! network namespace.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// A 48-bit hardware (MAC) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Build from raw link-layer bytes as reported by the kernel.
    /// Returns None unless exactly 6 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(octets))
    }
}

impl FromStr for MacAddress {
    type Err = String;

    /// Accepts `0a:1b:2c:3d:4e:5f` or `0a-1b-2c-3d-4e-5f`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains('-') { '-' } else { ':' };
        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(format!("expected 6 octets, found {}", parts.len()));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(format!("invalid octet '{}'", part));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|e| format!("invalid octet '{}': {}", part, e))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// IP family selector for route queries and secondary address lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "ipv4"),
            AddressFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// A kernel network link as seen from the namespace it was listed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    /// Interface index.
    pub index: u32,
    /// Interface name (e.g., "eth1").
    pub name: String,
    /// Hardware address, if the link has one.
    pub hardware_addr: Option<MacAddress>,
}

/// A routing table entry, reduced to what the default-route check needs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteRecord {
    /// Destination prefix; None for a default route.
    pub destination: Option<IpNet>,
    /// Preferred source address.
    pub source: Option<IpAddr>,
    /// Next-hop gateway.
    pub gateway: Option<IpAddr>,
    /// Output interface index.
    pub link_index: u32,
}

impl RouteRecord {
    /// Gateway of this route if it is a default route: no destination,
    /// no source, and a gateway set.
    pub fn default_gateway(&self) -> Option<IpAddr> {
        if self.destination.is_some() || self.source.is_some() {
            return None;
        }
        self.gateway.filter(|gw| !gw.is_unspecified())
    }
}

/// Addressing facts for one ENI, assembled from instance metadata.
///
/// Never persisted; rebuilt on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub mac_address: MacAddress,
    pub eni_id: String,
    pub device_name: String,
    pub ipv4_addresses: BTreeSet<Ipv4Addr>,
    pub ipv4_cidr: Ipv4Net,
    pub ipv6_addresses: BTreeSet<Ipv6Addr>,
    pub ipv6_cidrs: Vec<Ipv6Net>,
}

/// Gateway and netmask of the ENI's IPv4 subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    /// Subnet router address (network + 1).
    pub gateway: Ipv4Addr,
    /// Prefix length of the subnet.
    pub prefix_len: u8,
}

/// Compute the subnet router and netmask from an IPv4 CIDR block.
///
/// The VPC reserves the first host address of every subnet for its router.
pub fn ipv4_gateway_and_netmask(cidr_block: &str) -> Result<Ipv4Subnet, String> {
    let net: Ipv4Net = cidr_block
        .trim()
        .parse()
        .map_err(|e| format!("invalid ipv4 cidr block: {}", e))?;
    if net.prefix_len() > 30 {
        return Err(format!(
            "prefix length {} leaves no room for a subnet router",
            net.prefix_len()
        ));
    }
    let gateway = Ipv4Addr::from(u32::from(net.network()) + 1);
    Ok(Ipv4Subnet {
        gateway,
        prefix_len: net.prefix_len(),
    })
}

/// Prefix length of an IPv6 CIDR block (e.g., "2001:db8::/64" -> 64).
pub fn ipv6_prefix_length(cidr_block: &str) -> Result<u8, String> {
    let net: Ipv6Net = cidr_block
        .trim()
        .parse()
        .map_err(|e| format!("invalid ipv6 cidr block: {}", e))?;
    Ok(net.prefix_len())
}

/// Everything the in-namespace setup needs, bundled as a value.
///
/// Built once per setup call and consumed by the namespace executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfiguration {
    /// Interface name inside the container (e.g., "eth0").
    pub if_name: String,
    /// Device name on the host before the move.
    pub device_name: String,
    pub mac_address: MacAddress,
    pub ipv4_address: Ipv4Net,
    pub ipv6_address: Option<Ipv6Net>,
    pub ipv4_gateway: Ipv4Addr,
    pub ipv6_gateway: Option<Ipv6Addr>,
    /// Blackhole the instance metadata endpoints inside the namespace.
    pub block_imds: bool,
}

/// Teardown payload: the device to bring down, identified by MAC since
/// its in-namespace name is not known to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownConfiguration {
    pub mac_address: MacAddress,
}

/// Work handed to the scoped namespace primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NamespaceTask {
    Setup(NamespaceConfiguration),
    Teardown(TeardownConfiguration),
}

impl NamespaceTask {
    /// Short description used in logs.
    pub fn describe(&self) -> String {
        match self {
            NamespaceTask::Setup(c) => format!("setup {} as {}", c.device_name, c.if_name),
            NamespaceTask::Teardown(c) => format!("teardown {}", c.mac_address),
        }
    }
}

/// Typed inputs of a container namespace setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupRequest {
    /// Path to the container's network namespace (e.g., "/proc/1234/ns/net").
    pub netns: String,
    /// Interface name inside the container.
    pub if_name: String,
    /// Device name on the host.
    pub device_name: String,
    pub mac_address: MacAddress,
    pub ipv4_address: Ipv4Net,
    #[serde(default)]
    pub ipv6_address: Option<Ipv6Net>,
    pub ipv4_gateway: Ipv4Addr,
    #[serde(default)]
    pub ipv6_gateway: Option<Ipv6Addr>,
    #[serde(default)]
    pub block_imds: bool,
}

impl SetupRequest {
    /// Bundle the request into the value executed inside the namespace.
    pub fn namespace_configuration(&self) -> NamespaceConfiguration {
        NamespaceConfiguration {
            if_name: self.if_name.clone(),
            device_name: self.device_name.clone(),
            mac_address: self.mac_address,
            ipv4_address: self.ipv4_address,
            ipv6_address: self.ipv6_address,
            ipv4_gateway: self.ipv4_gateway,
            ipv6_gateway: self.ipv6_gateway,
            block_imds: self.block_imds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_colon() {
        let mac: MacAddress = "0a:1B:2c:3d:4e:5f".parse().unwrap();
        assert_eq!(mac.octets(), [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]);
        assert_eq!(mac.to_string(), "0a:1b:2c:3d:4e:5f");
    }

    #[test]
    fn test_mac_parse_dash() {
        let mac: MacAddress = "0a-1b-2c-3d-4e-5f".parse().unwrap();
        assert_eq!(mac, MacAddress::new([0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]));
    }

    #[test]
    fn test_mac_parse_rejects_garbage() {
        assert!("".parse::<MacAddress>().is_err());
        assert!("0a:1b:2c:3d:4e".parse::<MacAddress>().is_err());
        assert!("0a:1b:2c:3d:4e:zz".parse::<MacAddress>().is_err());
        assert!("0a:1b:2c:3d:4e:5f/".parse::<MacAddress>().is_err());
        assert!("a:1b:2c:3d:4e:5f".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_from_bytes() {
        assert!(MacAddress::from_bytes(&[1, 2, 3, 4, 5, 6]).is_some());
        assert!(MacAddress::from_bytes(&[1, 2, 3]).is_none());
        assert!(MacAddress::from_bytes(&[]).is_none());
    }

    #[test]
    fn test_mac_serde() {
        let mac = MacAddress::new([0x02, 0x42, 0x0a, 0x58, 0x00, 0x02]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"02:42:0a:58:00:02\"");
        let back: MacAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
    }

    #[test]
    fn test_default_route_predicate() {
        let gw: IpAddr = "fe80::1".parse().unwrap();
        let route = RouteRecord {
            gateway: Some(gw),
            link_index: 3,
            ..Default::default()
        };
        assert_eq!(route.default_gateway(), Some(gw));
    }

    #[test]
    fn test_route_with_destination_is_not_default() {
        let route = RouteRecord {
            destination: Some("2001:db8::/64".parse().unwrap()),
            gateway: Some("fe80::1".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(route.default_gateway(), None);
    }

    #[test]
    fn test_route_with_source_is_not_default() {
        let route = RouteRecord {
            source: Some("2001:db8::10".parse().unwrap()),
            gateway: Some("fe80::1".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(route.default_gateway(), None);
    }

    #[test]
    fn test_route_without_gateway_is_not_default() {
        assert_eq!(RouteRecord::default().default_gateway(), None);
        let unspecified = RouteRecord {
            gateway: Some("::".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(unspecified.default_gateway(), None);
    }

    #[test]
    fn test_ipv4_gateway_and_netmask() {
        let subnet = ipv4_gateway_and_netmask("10.0.16.0/20\n").unwrap();
        assert_eq!(subnet.gateway, Ipv4Addr::new(10, 0, 16, 1));
        assert_eq!(subnet.prefix_len, 20);
    }

    #[test]
    fn test_ipv4_gateway_uses_network_address() {
        let subnet = ipv4_gateway_and_netmask("172.31.5.77/24").unwrap();
        assert_eq!(subnet.gateway, Ipv4Addr::new(172, 31, 5, 1));
    }

    #[test]
    fn test_ipv4_gateway_rejects_bad_input() {
        assert!(ipv4_gateway_and_netmask("not-a-cidr").is_err());
        assert!(ipv4_gateway_and_netmask("2001:db8::/64").is_err());
        assert!(ipv4_gateway_and_netmask("10.0.0.1/32").is_err());
    }

    #[test]
    fn test_ipv6_prefix_length() {
        assert_eq!(ipv6_prefix_length("2001:db8::/64").unwrap(), 64);
        assert_eq!(ipv6_prefix_length("2600:1f14:abc:de00::/56").unwrap(), 56);
        assert!(ipv6_prefix_length("not-a-cidr").is_err());
        assert!(ipv6_prefix_length("10.0.0.0/16").is_err());
    }

    #[test]
    fn test_setup_request_to_configuration() {
        let request = SetupRequest {
            netns: "/var/run/netns/c1".to_string(),
            if_name: "eth0".to_string(),
            device_name: "eth1".to_string(),
            mac_address: "0a:1b:2c:3d:4e:5f".parse().unwrap(),
            ipv4_address: "10.0.16.9/20".parse().unwrap(),
            ipv6_address: None,
            ipv4_gateway: Ipv4Addr::new(10, 0, 16, 1),
            ipv6_gateway: None,
            block_imds: true,
        };
        let config = request.namespace_configuration();
        assert_eq!(config.if_name, "eth0");
        assert_eq!(config.device_name, "eth1");
        assert!(config.block_imds);
        assert_eq!(config.ipv4_address.prefix_len(), 20);
    }

    #[test]
    fn test_namespace_task_serde_tag() {
        let task = NamespaceTask::Teardown(TeardownConfiguration {
            mac_address: MacAddress::new([2, 0, 0, 0, 0, 1]),
        });
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "teardown");
        assert_eq!(json["mac_address"], "02:00:00:00:00:01");
    }
}
