//! Hardware address to kernel link resolution.

use tracing::debug;

use eni_core::{EniError, LinkRecord, MacAddress, Result};

use crate::Engine;

impl Engine {
    /// Find the host link whose hardware address is `mac`.
    pub async fn find_device_by_hardware_address(&self, mac: &str) -> Result<LinkRecord> {
        const OP: &str = "find_device_by_hardware_address";
        let hardware_addr: MacAddress =
            mac.trim().parse().map_err(|_| EniError::MalformedAddress {
                op: OP,
                mac: mac.to_string(),
            })?;
        let device = hardware_addr.to_string();

        let links = self
            .netlink
            .link_list()
            .await
            .map_err(|source| EniError::DeviceNotFound {
                op: OP,
                device: device.clone(),
                source: Some(source),
            })?;

        let link = links
            .into_iter()
            .find(|l| l.hardware_addr == Some(hardware_addr))
            .ok_or(EniError::DeviceNotFound {
                op: OP,
                device,
                source: None,
            })?;
        debug!(mac = %hardware_addr, device = %link.name, "Found device");
        Ok(link)
    }

    /// Name of the host link whose hardware address is `mac`.
    pub async fn device_name_for_mac(&self, mac: &str) -> Result<String> {
        Ok(self.find_device_by_hardware_address(mac).await?.name)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{engine, MockMetadata, MockNetLink, MockNetNs, MAC};
    use eni_core::ErrorKind;
    use std::error::Error as _;
    use std::sync::Arc;

    fn with_netlink(netlink: MockNetLink) -> crate::Engine {
        engine(
            Arc::new(MockMetadata::new()),
            Arc::new(netlink),
            Arc::new(MockNetNs::new()),
        )
    }

    #[tokio::test]
    async fn test_find_device_by_hardware_address() {
        let engine = with_netlink(MockNetLink::host());
        let link = engine.find_device_by_hardware_address(MAC).await.unwrap();
        assert_eq!(link.name, "eth1");
        assert_eq!(link.index, 3);
    }

    #[tokio::test]
    async fn test_find_device_is_case_and_separator_insensitive() {
        let engine = with_netlink(MockNetLink::host());
        let name = engine
            .device_name_for_mac("0A-1B-2C-3D-4E-5F")
            .await
            .unwrap();
        assert_eq!(name, "eth1");
    }

    #[tokio::test]
    async fn test_find_device_malformed_mac() {
        let netlink = Arc::new(MockNetLink::host());
        let engine = engine(
            Arc::new(MockMetadata::new()),
            netlink.clone(),
            Arc::new(MockNetNs::new()),
        );
        let err = engine
            .find_device_by_hardware_address("not-a-mac")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedAddress);
        assert!(netlink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_find_device_not_found() {
        let engine = with_netlink(MockNetLink::host());
        let err = engine
            .find_device_by_hardware_address("02:ff:ff:ff:ff:ff")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
        assert!(err
            .to_string()
            .ends_with("unable to find device '02:ff:ff:ff:ff:ff'"));
        assert!(err.source().is_none());
    }

    #[tokio::test]
    async fn test_find_device_link_list_failure() {
        let engine = with_netlink(MockNetLink::host().failing_link_list());
        let err = engine.find_device_by_hardware_address(MAC).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
        assert!(err.source().is_some());
    }
}
