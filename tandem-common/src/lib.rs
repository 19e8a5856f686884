//! Common types shared between the Tandem orchestration core and its callers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Node liveness as reported by the cluster manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeLiveness {
    Online,
    Offline,
}

/// Cluster node, discovered at query time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub liveness: NodeLiveness,
}

/// Node membership report.
///
/// `online` and `offline` are disjoint and together make up `nodes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeList {
    pub nodes: Vec<String>,
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

impl NodeList {
    pub fn new(online: Vec<String>, offline: Vec<String>) -> Self {
        let nodes = online.iter().chain(offline.iter()).cloned().collect();
        Self { nodes, online, offline }
    }

    pub fn liveness(&self, id: &str) -> Option<NodeLiveness> {
        if self.online.iter().any(|n| n == id) {
            Some(NodeLiveness::Online)
        } else if self.offline.iter().any(|n| n == id) {
            Some(NodeLiveness::Offline)
        } else {
            None
        }
    }

    pub fn to_nodes(&self) -> Vec<Node> {
        let online = self.online.iter().map(|id| Node {
            id: id.clone(),
            liveness: NodeLiveness::Online,
        });
        let offline = self.offline.iter().map(|id| Node {
            id: id.clone(),
            liveness: NodeLiveness::Offline,
        });
        online.chain(offline).collect()
    }
}

/// HA framework status, derived from the cluster manager on every query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkStatus {
    Up,
    Down,
}

impl fmt::Display for FrameworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameworkStatus::Up => write!(f, "up"),
            FrameworkStatus::Down => write!(f, "down"),
        }
    }
}

/// Target of a standby toggle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeTarget {
    All,
    Node(String),
}

impl NodeTarget {
    /// `"all"` selects every node, anything else names exactly one node.
    pub fn parse(node: &str) -> Result<Self> {
        if node == "all" {
            return Ok(NodeTarget::All);
        }
        validate_identifier("node", node)?;
        Ok(NodeTarget::Node(node.to_string()))
    }
}

impl FromStr for NodeTarget {
    type Err = Error;

    fn from_str(node: &str) -> Result<Self> {
        NodeTarget::parse(node)
    }
}

/// Check a node id or resource name before it reaches a cluster manager
/// command line. Empty ids, ids with whitespace or control characters, and
/// ids starting with `-` (which would be read as an option) are rejected.
pub fn validate_identifier(kind: &'static str, id: &str) -> Result<()> {
    let malformed = id.is_empty()
        || id.starts_with('-')
        || id.chars().any(|c| c.is_whitespace() || c.is_control());
    if malformed {
        return Err(Error::InvalidIdentifier {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for NodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTarget::All => write!(f, "all nodes"),
            NodeTarget::Node(name) => write!(f, "{}", name),
        }
    }
}

/// Maintenance mode of a node, independent of its liveness
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    Active,  // hosts resources
    Passive, // standby
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMode::Active => write!(f, "active"),
            NodeMode::Passive => write!(f, "passive"),
        }
    }
}

/// Result of a successful standby toggle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeTransition {
    pub target: NodeTarget,
    pub mode: NodeMode,
    pub message: String,
}

impl NodeTransition {
    pub fn new(target: NodeTarget, mode: NodeMode) -> Self {
        let message = format!("Successfully put {} on {} state", target, mode);
        Self { target, mode, message }
    }
}

/// Interval and timeout of one resource operation, in cluster-manager
/// duration syntax (e.g. "10s", "2min")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpTiming {
    pub interval: String,
    pub timeout: String,
}

impl OpTiming {
    pub fn new(interval: impl Into<String>, timeout: impl Into<String>) -> Self {
        Self {
            interval: interval.into(),
            timeout: timeout.into(),
        }
    }
}

/// Managed service declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub service: String,  // e.g. "csm_agent"
    pub provider: String, // e.g. "systemd"
    pub start: OpTiming,
    pub monitor: OpTiming,
    pub stop: OpTiming,
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandExecution {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Failed to run command `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HA framework is not initialized (status {status}): `{command}` reported: {stderr}")]
    FrameworkNotInitialized {
        status: FrameworkStatus,
        command: String,
        stderr: String,
    },

    #[error("Error initializing resource agent {agent}: {source}")]
    ResourceAgentInit {
        agent: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to put {node} on {direction} state: {source}")]
    NodeOperation {
        node: NodeTarget,
        direction: NodeMode,
        #[source]
        source: Box<Error>,
    },

    #[error("Resource agent {agent} is partially configured (missing {missing:?}), use force")]
    PartiallyConfigured { agent: String, missing: Vec<String> },

    #[error("Invalid {kind} identifier {id:?}")]
    InvalidIdentifier { kind: &'static str, id: String },

    #[error("Malformed node status report: {0}")]
    MalformedNodeReport(String),

    #[error("Resource agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The failing command line, when the error came from the cluster manager.
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::CommandExecution { command, .. }
            | Error::CommandTimeout { command, .. }
            | Error::CommandSpawn { command, .. }
            | Error::FrameworkNotInitialized { command, .. } => Some(command),
            Error::ResourceAgentInit { source, .. } | Error::NodeOperation { source, .. } => {
                source.command()
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
