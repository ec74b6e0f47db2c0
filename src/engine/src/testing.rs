//! In-memory collaborators for engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eni_core::{
    AddressFamily, EngineConfig, HostError, LinkRecord, MacAddress, MetadataClient,
    NamespaceHandle, NamespaceTask, NetLink, NetNs, RetryPolicy, RouteRecord,
};

use crate::Engine;

pub const MAC: &str = "0a:1b:2c:3d:4e:5f";

pub fn mac() -> MacAddress {
    MAC.parse().unwrap()
}

/// Scripted responses, consumed front to back. The last one repeats.
struct Script<T> {
    responses: VecDeque<Result<T, String>>,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Result<T, String> {
        if self.responses.len() > 1 {
            self.responses.pop_front().unwrap()
        } else {
            self.responses.front().cloned().unwrap()
        }
    }
}

/// Metadata service double keyed by path. Unknown paths return 404.
#[derive(Default)]
pub struct MockMetadata {
    scripts: Mutex<HashMap<String, Script<String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, body: &str) -> Self {
        self.script(path, vec![Ok(body)])
    }

    pub fn failing(self, path: &str) -> Self {
        self.script(path, vec![Err("connection refused")])
    }

    pub fn script(self, path: &str, responses: Vec<Result<&str, &str>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), Script { responses });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl MetadataClient for MockMetadata {
    async fn get_metadata(&self, path: &str) -> Result<String, HostError> {
        self.calls.lock().unwrap().push(path.to_string());
        match self.scripts.lock().unwrap().get_mut(path) {
            Some(script) => script.next().map_err(HostError::Metadata),
            None => Err(HostError::NotFound(path.to_string())),
        }
    }
}

/// Kernel networking double.
pub struct MockNetLink {
    links: Vec<LinkRecord>,
    routes: Mutex<Script<Vec<RouteRecord>>>,
    fail_link_list: bool,
    fail_set_ns: bool,
    calls: Mutex<Vec<String>>,
}

impl MockNetLink {
    pub fn new(links: Vec<LinkRecord>) -> Self {
        Self {
            links,
            routes: Mutex::new(Script {
                responses: VecDeque::from([Ok(Vec::new())]),
            }),
            fail_link_list: false,
            fail_set_ns: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A host with `lo` and the ENI device `eth1` carrying [`MAC`].
    pub fn host() -> Self {
        Self::new(vec![
            LinkRecord {
                index: 1,
                name: "lo".to_string(),
                hardware_addr: None,
            },
            LinkRecord {
                index: 2,
                name: "eth0".to_string(),
                hardware_addr: Some(MacAddress::new([0x02, 0, 0, 0, 0, 0x01])),
            },
            LinkRecord {
                index: 3,
                name: "eth1".to_string(),
                hardware_addr: Some(mac()),
            },
        ])
    }

    pub fn with_routes(self, responses: Vec<Result<Vec<RouteRecord>, &str>>) -> Self {
        *self.routes.lock().unwrap() = Script {
            responses: responses
                .into_iter()
                .map(|r| r.map_err(str::to_string))
                .collect(),
        };
        self
    }

    pub fn failing_link_list(mut self) -> Self {
        self.fail_link_list = true;
        self
    }

    pub fn failing_set_ns(mut self) -> Self {
        self.fail_set_ns = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NetLink for MockNetLink {
    async fn link_list(&self) -> Result<Vec<LinkRecord>, HostError> {
        self.record("link_list".to_string());
        if self.fail_link_list {
            return Err(HostError::Netlink("netlink socket closed".to_string()));
        }
        Ok(self.links.clone())
    }

    async fn link_by_name(&self, name: &str) -> Result<LinkRecord, HostError> {
        self.record(format!("link_by_name {}", name));
        self.links
            .iter()
            .find(|l| l.name == name)
            .cloned()
            .ok_or_else(|| HostError::Netlink(format!("link '{}' not found", name)))
    }

    async fn link_set_ns(&self, link: &LinkRecord, ns: &NamespaceHandle) -> Result<(), HostError> {
        self.record(format!("link_set_ns {} {}", link.name, ns.path().display()));
        if self.fail_set_ns {
            return Err(HostError::Netlink("operation not permitted".to_string()));
        }
        Ok(())
    }

    async fn route_list(
        &self,
        link: &LinkRecord,
        family: AddressFamily,
    ) -> Result<Vec<RouteRecord>, HostError> {
        self.record(format!("route_list {} {}", link.name, family));
        self.routes.lock().unwrap().next().map_err(HostError::Netlink)
    }
}

/// Namespace double recording every task it is asked to run.
#[derive(Default)]
pub struct MockNetNs {
    fail_get_ns: bool,
    fail_run: bool,
    tasks: Mutex<Vec<(String, NamespaceTask)>>,
}

impl MockNetNs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_get_ns(mut self) -> Self {
        self.fail_get_ns = true;
        self
    }

    pub fn failing_run(mut self) -> Self {
        self.fail_run = true;
        self
    }

    pub fn tasks(&self) -> Vec<(String, NamespaceTask)> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetNs for MockNetNs {
    fn get_ns(&self, path: &str) -> Result<NamespaceHandle, HostError> {
        if self.fail_get_ns {
            return Err(HostError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file or directory",
            )));
        }
        let file = tempfile::tempfile()?;
        Ok(NamespaceHandle::new(PathBuf::from(path), file))
    }

    async fn run_in_namespace(&self, path: &str, task: NamespaceTask) -> Result<(), HostError> {
        self.tasks.lock().unwrap().push((path.to_string(), task));
        if self.fail_run {
            return Err(HostError::Netlink("file exists".to_string()));
        }
        Ok(())
    }
}

/// Short, distinct policies so tests can assert elapsed time exactly.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        metadata_retry: RetryPolicy::new(5, Duration::from_millis(200)).unwrap(),
        gateway_poll: RetryPolicy::new(10, Duration::from_secs(1)).unwrap(),
        ..EngineConfig::default()
    }
}

/// Engine over the given doubles; the doubles stay inspectable.
pub fn engine(
    metadata: Arc<MockMetadata>,
    netlink: Arc<MockNetLink>,
    netns: Arc<MockNetNs>,
) -> Engine {
    Engine::with_collaborators(metadata, netlink, netns, test_config())
}
