//! Cluster manager backends
//!
//! Resource agents and the HA framework talk to the cluster manager only
//! through [`ClusterBackend`], so another manager can be substituted without
//! touching placement or membership logic.

pub mod pcs;

pub use pcs::PcsBackend;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tandem_common::{FrameworkStatus, NodeList, NodeMode, NodeTarget, Resource, Result};

/// Failure timeout attached to every created resource
pub const FAILURE_TIMEOUT: &str = "10s";

/// One staged configuration command.
///
/// Every directive references the staging document it edits; only `Push`
/// touches the live configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Snapshot the live configuration into the staging document
    OpenStaging { staging: PathBuf },
    CreateResource {
        staging: PathBuf,
        resource: Resource,
        failure_timeout: String,
    },
    /// All listed resources run on the same node
    Colocate {
        staging: PathBuf,
        resources: Vec<String>,
    },
    /// Listed resources start in order and stop in reverse
    Order {
        staging: PathBuf,
        resources: Vec<String>,
    },
    Prefer {
        staging: PathBuf,
        resource: String,
        node: String,
        score: i64,
    },
    /// Replace the live configuration with the staging document
    Push { staging: PathBuf },
}

impl Directive {
    pub fn staging(&self) -> &Path {
        match self {
            Directive::OpenStaging { staging }
            | Directive::CreateResource { staging, .. }
            | Directive::Colocate { staging, .. }
            | Directive::Order { staging, .. }
            | Directive::Prefer { staging, .. }
            | Directive::Push { staging } => staging,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Directive::OpenStaging { .. } => "open-staging",
            Directive::CreateResource { .. } => "create-resource",
            Directive::Colocate { .. } => "colocation",
            Directive::Order { .. } => "ordering",
            Directive::Prefer { .. } => "location-preference",
            Directive::Push { .. } => "push",
        }
    }
}

/// Answer to a cluster status query, with the command that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: FrameworkStatus,
    pub command: String,
    /// Error text of the manager, or why it did not answer; empty when up
    pub stderr: String,
}

/// Operations the orchestration core needs from a cluster manager
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// `Down` whenever the manager answers with error text or does not answer.
    async fn cluster_status(&self) -> StatusReport;

    async fn list_nodes(&self) -> Result<NodeList>;

    /// `Active` leaves standby, `Passive` enters it.
    async fn set_standby(&self, target: &NodeTarget, mode: NodeMode) -> Result<()>;

    /// Succeeds if the resource is defined in the live configuration.
    async fn query_resource(&self, resource: &str) -> Result<()>;

    async fn delete_resource(&self, resource: &str) -> Result<()>;

    /// Apply a directive to its staging document.
    async fn stage(&self, directive: &Directive) -> Result<()>;

    /// Push a staging document to the live configuration.
    async fn apply_staged(&self, staging: &Path) -> Result<()>;
}
