//! Host collaborator traits.
//!
//! The engine talks to the instance metadata service, the kernel's
//! networking stack and network namespaces only through these traits, so
//! its retry and orchestration logic can run against in-memory doubles.

use async_trait::async_trait;
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::HostError;
use crate::network::{AddressFamily, LinkRecord, NamespaceTask, RouteRecord};

/// Read-only access to the instance metadata service.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Fetch a metadata path relative to the `meta-data/` root.
    async fn get_metadata(&self, path: &str) -> Result<String, HostError>;
}

/// Kernel networking primitives, executed in the caller's namespace.
#[async_trait]
pub trait NetLink: Send + Sync {
    /// List every link.
    async fn link_list(&self) -> Result<Vec<LinkRecord>, HostError>;

    /// Find a link by interface name.
    async fn link_by_name(&self, name: &str) -> Result<LinkRecord, HostError>;

    /// Reassign a link into another network namespace.
    async fn link_set_ns(&self, link: &LinkRecord, ns: &NamespaceHandle) -> Result<(), HostError>;

    /// List routes of one family whose output interface is `link`.
    async fn route_list(
        &self,
        link: &LinkRecord,
        family: AddressFamily,
    ) -> Result<Vec<RouteRecord>, HostError>;
}

/// Network namespace primitives.
#[async_trait]
pub trait NetNs: Send + Sync {
    /// Open the namespace at `path`.
    fn get_ns(&self, path: &str) -> Result<NamespaceHandle, HostError>;

    /// Run `task` inside the namespace at `path`.
    ///
    /// Implementations must restore the executing thread's original
    /// namespace on every exit path, and must not let two calls share a
    /// thread while inside the namespace.
    async fn run_in_namespace(&self, path: &str, task: NamespaceTask) -> Result<(), HostError>;
}

/// An open reference to a network namespace.
///
/// Holds the namespace file open for as long as the handle lives; never
/// cached across operations.
#[derive(Debug)]
pub struct NamespaceHandle {
    path: PathBuf,
    file: File,
}

impl NamespaceHandle {
    pub fn new(path: impl Into<PathBuf>, file: File) -> Self {
        Self {
            path: path.into(),
            file,
        }
    }

    /// Open the namespace file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::new(path, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for NamespaceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for NamespaceHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
