//! Moving an ENI device into a container namespace and configuring it.
//!
//! Setup walks the device through `HostSide -> MovedToContainerNS ->
//! Configured`. A failure at any step aborts with the step's error. There
//! is no rollback: if configuration fails after the move, the device stays
//! in the container namespace unconfigured.

use tracing::info;

use eni_core::{EniError, MacAddress, NamespaceTask, Result, SetupRequest, TeardownConfiguration};

use crate::Engine;

impl Engine {
    /// Move the request's device into its namespace and configure it there.
    pub async fn setup(&self, request: &SetupRequest) -> Result<()> {
        const OP: &str = "setup";
        let device = &request.device_name;
        let netns = &request.netns;

        let link = self
            .netlink
            .link_by_name(device)
            .await
            .map_err(|source| EniError::DeviceNotFound {
                op: OP,
                device: device.clone(),
                source: Some(source),
            })?;

        let ns = self
            .netns
            .get_ns(netns)
            .map_err(|source| EniError::NamespaceUnavailable {
                op: OP,
                netns: netns.clone(),
                source,
            })?;

        info!(device = %device, netns = %netns, "Moving device to container namespace");
        self.netlink
            .link_set_ns(&link, &ns)
            .await
            .map_err(|source| EniError::NamespaceMoveFailed {
                op: OP,
                device: device.clone(),
                netns: netns.clone(),
                source,
            })?;

        let task = NamespaceTask::Setup(request.namespace_configuration());
        self.netns
            .run_in_namespace(netns, task)
            .await
            .map_err(|source| EniError::NamespaceExecutionFailed {
                op: OP,
                action: "configure",
                device: device.clone(),
                netns: netns.clone(),
                source,
            })?;

        info!(device = %device, if_name = %request.if_name, netns = %netns, "Device configured in container namespace");
        Ok(())
    }

    /// Bring down the device carrying `mac_address` inside `netns`.
    ///
    /// A device that is already gone is not an error.
    pub async fn teardown(&self, netns: &str, mac_address: MacAddress) -> Result<()> {
        info!(mac = %mac_address, netns = %netns, "Tearing down device");
        let task = NamespaceTask::Teardown(TeardownConfiguration { mac_address });
        self.netns
            .run_in_namespace(netns, task)
            .await
            .map_err(|source| EniError::NamespaceExecutionFailed {
                op: "teardown",
                action: "tear down",
                device: mac_address.to_string(),
                netns: netns.to_string(),
                source,
            })
    }
}
