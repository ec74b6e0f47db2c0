//! The ENI attachment engine.
//!
//! Operations are split by concern across sibling modules:
//! - `metadata`: MAC and addressing discovery from instance metadata
//! - `device`: hardware address to kernel link resolution
//! - `gateway`: IPv6 default gateway polling
//! - `orchestrator`: namespace move, configure and teardown

use std::sync::Arc;

use eni_core::{EngineConfig, EniError, MetadataClient, NetLink, NetNs, Result};
use eni_netns::{NetnsExecutor, RtNetlink};

use crate::imds::ImdsClient;

/// Discovers ENI facts and moves ENI devices into container namespaces.
///
/// Holds only immutable configuration and shared collaborators, so one
/// engine can serve concurrent calls for independent containers.
#[derive(Clone)]
pub struct Engine {
    pub(crate) metadata: Arc<dyn MetadataClient>,
    pub(crate) netlink: Arc<dyn NetLink>,
    pub(crate) netns: Arc<dyn NetNs>,
    pub(crate) config: EngineConfig,
}

impl Engine {
    /// Create an engine backed by the instance metadata service, rtnetlink
    /// and `setns(2)`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let imds = ImdsClient::new(config.imds.clone())
            .map_err(|e| EniError::Config(format!("failed to create metadata client: {}", e)))?;
        Ok(Self::with_collaborators(
            Arc::new(imds),
            Arc::new(RtNetlink::new()),
            Arc::new(NetnsExecutor::new()),
            config,
        ))
    }

    /// Create an engine over caller-supplied collaborators.
    pub fn with_collaborators(
        metadata: Arc<dyn MetadataClient>,
        netlink: Arc<dyn NetLink>,
        netns: Arc<dyn NetNs>,
        config: EngineConfig,
    ) -> Self {
        Self {
            metadata,
            netlink,
            netns,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
