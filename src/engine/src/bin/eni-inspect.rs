//! Diagnostic tool printing what the engine discovers about an ENI.
//!
//! Read-only: queries instance metadata and the host's links and routes,
//! never moves or configures anything. The report goes to stdout as JSON,
//! logs go to stderr.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use eni_core::log::{init_tracing, LogFormat};
use eni_core::{EngineConfig, InterfaceDescriptor};
use eni_engine::Engine;

#[derive(Parser, Debug)]
#[command(name = "eni-inspect")]
#[command(about = "Inspect an attached ENI as seen by the attachment engine")]
#[command(version)]
struct Args {
    /// ENI identifier (e.g., eni-0123456789abcdef0)
    #[arg(long)]
    eni_id: String,

    /// Also poll the device's route table for its IPv6 default gateway
    #[arg(long)]
    ipv6_gateway: bool,

    /// Check whether these addresses are assigned to the ENI
    #[arg(long = "address")]
    addresses: Vec<IpAddr>,

    /// Log output format (text, json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Serialize)]
struct Report {
    #[serde(flatten)]
    descriptor: InterfaceDescriptor,
    ipv4_gateway: Ipv4Addr,
    ipv4_prefix_len: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv6_prefix_len: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv6_gateway: Option<Ipv6Addr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    address_checks: Vec<AddressCheck>,
}

#[derive(Serialize)]
struct AddressCheck {
    address: IpAddr,
    assigned: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    let engine = Engine::new(config)?;

    let descriptor = engine.describe_eni(&args.eni_id).await?;
    let mac = descriptor.mac_address.to_string();
    let subnet = engine.resolve_ipv4_gateway_and_netmask(&mac).await?;

    let ipv6_prefix_len = if descriptor.ipv6_cidrs.is_empty() {
        None
    } else {
        Some(engine.resolve_ipv6_prefix_length(&mac).await?)
    };

    let ipv6_gateway = if args.ipv6_gateway {
        Some(engine.discover_ipv6_gateway(&descriptor.device_name).await?)
    } else {
        None
    };

    let mut address_checks = Vec::with_capacity(args.addresses.len());
    for address in args.addresses {
        let assigned = engine.matches_secondary_address(&mac, address).await?;
        address_checks.push(AddressCheck { address, assigned });
    }

    let report = Report {
        descriptor,
        ipv4_gateway: subnet.gateway,
        ipv4_prefix_len: subnet.prefix_len,
        ipv6_prefix_len,
        ipv6_gateway,
        address_checks,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
