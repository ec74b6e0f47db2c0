//! Scoped execution inside a Linux network namespace.
//!
//! `setns(2)` switches the namespace of the calling thread only. Every
//! scoped operation therefore gets its own OS thread: the thread enters the
//! target namespace, runs the task on a single-threaded runtime, and
//! switches back through a drop guard before it exits, whether the task
//! returned normally, failed, or panicked.

use async_trait::async_trait;
use nix::sched::{setns, CloneFlags};
use nix::sys::statfs::{fstatfs, NSFS_MAGIC, PROC_SUPER_MAGIC};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use eni_core::{HostError, NamespaceHandle, NamespaceTask, NetNs};

use crate::configure;

/// Network namespace of the calling thread.
const CURRENT_THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Namespace executor backed by `setns(2)` on dedicated threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetnsExecutor;

impl NetnsExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetNs for NetnsExecutor {
    fn get_ns(&self, path: &str) -> Result<NamespaceHandle, HostError> {
        let handle = NamespaceHandle::open(path)?;
        // Namespace files live on nsfs; kernels before 3.19 expose them on procfs.
        let fs = fstatfs(&handle)
            .map_err(|e| HostError::Namespace(format!("failed to stat {}: {}", path, e)))?;
        let fs_type = fs.filesystem_type();
        if fs_type != NSFS_MAGIC && fs_type != PROC_SUPER_MAGIC {
            return Err(HostError::Namespace(format!(
                "{} is not a network namespace",
                path
            )));
        }
        Ok(handle)
    }

    async fn run_in_namespace(&self, path: &str, task: NamespaceTask) -> Result<(), HostError> {
        debug!(netns = %path, task = %task.describe(), "Running task in network namespace");
        with_netns_path(path, move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(configure::execute(task))
        })
        .await
    }
}

/// Run `f` inside the network namespace at `path` on a dedicated thread.
pub async fn with_netns_path<F, R>(path: &str, f: F) -> Result<R, HostError>
where
    F: FnOnce() -> Result<R, HostError> + Send + 'static,
    R: Send + 'static,
{
    let path = PathBuf::from(path);
    spawn_pinned(move || {
        let target = File::open(&path)?;
        let _guard = NamespaceGuard::enter(&target, &path)?;
        f()
    })
    .await
}

/// Run `f` on a fresh OS thread and wait for its result.
///
/// A panic inside `f` is reported as a namespace error instead of being
/// propagated to the caller's task.
async fn spawn_pinned<F, R>(f: F) -> Result<R, HostError>
where
    F: FnOnce() -> Result<R, HostError> + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::Builder::new()
        .name("eni-netns".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        })?;

    rx.await.map_err(|_| {
        HostError::Namespace("namespace worker thread terminated abnormally".to_string())
    })?
}

/// Restores the thread's original network namespace on drop.
struct NamespaceGuard {
    original: File,
}

impl NamespaceGuard {
    fn enter(target: &File, path: &Path) -> Result<Self, HostError> {
        let original = File::open(CURRENT_THREAD_NETNS)?;
        setns(target, CloneFlags::CLONE_NEWNET).map_err(|e| {
            HostError::Namespace(format!("failed to enter {}: {}", path.display(), e))
        })?;
        debug!(netns = %path.display(), "Entered network namespace");
        Ok(Self { original })
    }
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        // The worker thread exits right after this, so a failed restore
        // cannot leak into later work.
        if let Err(e) = setns(&self.original, CloneFlags::CLONE_NEWNET) {
            error!(error = %e, "Failed to restore original network namespace");
        }
    }
}
