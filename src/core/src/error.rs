use thiserror::Error;

/// Failure reported by a host collaborator (metadata transport, netlink,
/// namespace syscalls). Engine operations wrap it with their own context.
#[derive(Error, Debug)]
pub enum HostError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Instance metadata request failed
    #[error("metadata request failed: {0}")]
    Metadata(String),

    /// Instance metadata has no such path (HTTP 404)
    #[error("metadata path not found: {0}")]
    NotFound(String),

    /// Netlink request failed
    #[error("netlink error: {0}")]
    Netlink(String),

    /// Namespace switch or worker failure
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// ENI engine error types.
///
/// Every variant names the operation that failed (`op`) and the
/// identifiers involved, so a single error reaching the CNI boundary is
/// enough to diagnose the failure.
#[derive(Error, Debug)]
pub enum EniError {
    /// Hardware address text could not be parsed
    #[error("{op}: malformed mac address '{mac}'")]
    MalformedAddress { op: &'static str, mac: String },

    /// No kernel link matches the device name or hardware address
    #[error("{op}: unable to find device '{device}'")]
    DeviceNotFound {
        op: &'static str,
        device: String,
        #[source]
        source: Option<HostError>,
    },

    /// No metadata MAC candidate carries the ENI id
    #[error("{op}: mac address of ENI '{eni_id}' not found")]
    UnmappedMacAddress { op: &'static str, eni_id: String },

    /// Gateway polling exhausted without a default route
    #[error("{op}: unable to get gateway from route table for '{device}' after {ticks} attempts")]
    GatewayNotFound {
        op: &'static str,
        device: String,
        ticks: u32,
    },

    /// Metadata or route-table transport failure
    #[error("{op}: {detail}")]
    MetadataUnavailable {
        op: &'static str,
        detail: String,
        #[source]
        source: HostError,
    },

    /// Malformed CIDR or address text
    #[error("{op}: unable to parse '{input}': {reason}")]
    Parse {
        op: &'static str,
        input: String,
        reason: String,
    },

    /// Namespace path could not be opened
    #[error("{op}: unable to get network namespace for '{netns}'")]
    NamespaceUnavailable {
        op: &'static str,
        netns: String,
        #[source]
        source: HostError,
    },

    /// Link could not be reassigned into the namespace
    #[error("{op}: unable to move device '{device}' to container namespace '{netns}'")]
    NamespaceMoveFailed {
        op: &'static str,
        device: String,
        netns: String,
        #[source]
        source: HostError,
    },

    /// Work inside the namespace failed; `action` names it ("configure",
    /// "tear down")
    #[error("{op}: unable to {action} device '{device}' in namespace '{netns}'")]
    NamespaceExecutionFailed {
        op: &'static str,
        action: &'static str,
        device: String,
        netns: String,
        #[source]
        source: HostError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Field-less discriminant of [`EniError`], for matching without caring
/// about the attached context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedAddress,
    DeviceNotFound,
    UnmappedMacAddress,
    GatewayNotFound,
    MetadataUnavailable,
    Parse,
    NamespaceUnavailable,
    NamespaceMoveFailed,
    NamespaceExecutionFailed,
    Config,
}

impl EniError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EniError::MalformedAddress { .. } => ErrorKind::MalformedAddress,
            EniError::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            EniError::UnmappedMacAddress { .. } => ErrorKind::UnmappedMacAddress,
            EniError::GatewayNotFound { .. } => ErrorKind::GatewayNotFound,
            EniError::MetadataUnavailable { .. } => ErrorKind::MetadataUnavailable,
            EniError::Parse { .. } => ErrorKind::Parse,
            EniError::NamespaceUnavailable { .. } => ErrorKind::NamespaceUnavailable,
            EniError::NamespaceMoveFailed { .. } => ErrorKind::NamespaceMoveFailed,
            EniError::NamespaceExecutionFailed { .. } => ErrorKind::NamespaceExecutionFailed,
            EniError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias for ENI engine operations
pub type Result<T> = std::result::Result<T, EniError>;
