//! HA framework
//!
//! Aggregates the resource agents with node membership and standby control
//! from the cluster manager. Nothing here is cached: membership and status
//! are re-read from the manager on every call.

use crate::agent::ResourceAgent;
use crate::backend::{ClusterBackend, StatusReport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tandem_common::{
    Error, FrameworkStatus, NodeList, NodeMode, NodeTarget, NodeTransition, Result,
};
use tracing::{error, info, warn};

/// Whether the managed resource set is serving and where
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum FailoverState {
    /// Resources available, every node online
    Nominal,
    /// Resources available while some nodes are offline
    FailedOver { offline: Vec<String> },
    /// At least one resource group is not available
    Unavailable,
}

/// Contract of an HA framework
#[async_trait]
pub trait HaFramework: Send + Sync {
    /// Initialize every resource agent. Requires the cluster to be up.
    async fn init(&self, force: bool) -> Result<()>;

    async fn failover(&self) -> Result<FailoverState>;

    /// Whether the managed resource set is currently serving.
    async fn is_available(&self) -> bool;

    async fn get_nodes(&self) -> Result<NodeList>;

    async fn get_status(&self) -> FrameworkStatus;

    /// Take `node` (or `"all"`) out of standby.
    async fn make_node_active(&self, node: &str) -> Result<NodeTransition>;

    /// Put `node` (or `"all"`) in standby for maintenance.
    async fn make_node_passive(&self, node: &str) -> Result<NodeTransition>;
}

/// HA framework over a cluster backend and a fixed set of resource agents
pub struct ClusterFramework {
    backend: Arc<dyn ClusterBackend>,
    agents: Vec<Arc<dyn ResourceAgent>>,
}

impl ClusterFramework {
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        Self {
            backend,
            agents: Vec::new(),
        }
    }

    pub fn with_agents(
        backend: Arc<dyn ClusterBackend>,
        agents: Vec<Arc<dyn ResourceAgent>>,
    ) -> Result<Self> {
        let mut framework = Self::new(backend);
        for agent in agents {
            framework.register(agent)?;
        }
        Ok(framework)
    }

    /// Add an agent; names are unique and agents initialize in registration order.
    pub fn register(&mut self, agent: Arc<dyn ResourceAgent>) -> Result<()> {
        if self.agent(agent.name()).is_some() {
            return Err(Error::DuplicateAgent(agent.name().to_string()));
        }
        self.agents.push(agent);
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&Arc<dyn ResourceAgent>> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    async fn set_mode(&self, node: &str, mode: NodeMode) -> Result<NodeTransition> {
        let target = NodeTarget::parse(node).map_err(|e| {
            error!(node = node, mode = %mode, error = %e, "Rejected node target");
            e
        })?;
        match self.backend.set_standby(&target, mode).await {
            Ok(()) => Ok(NodeTransition::new(target, mode)),
            Err(e) => {
                error!(node = %target, mode = %mode, error = %e, "Node mode change failed");
                Err(Error::NodeOperation {
                    node: target,
                    direction: mode,
                    source: Box::new(e),
                })
            }
        }
    }
}

#[async_trait]
impl HaFramework for ClusterFramework {
    async fn init(&self, force: bool) -> Result<()> {
        let StatusReport {
            status,
            command,
            stderr,
        } = self.backend.cluster_status().await;
        if status != FrameworkStatus::Up {
            warn!(status = %status, stderr = %stderr, "Cluster manager not running");
            return Err(Error::FrameworkNotInitialized {
                status,
                command,
                stderr,
            });
        }

        for agent in &self.agents {
            info!(agent = agent.name(), force = force, "Initializing resource agent");
            agent.init(force).await.map_err(|e| Error::ResourceAgentInit {
                agent: agent.name().to_string(),
                source: Box::new(e),
            })?;
        }

        info!(agents = self.agents.len(), "HA framework initialized");
        Ok(())
    }

    async fn failover(&self) -> Result<FailoverState> {
        if !self.is_available().await {
            return Ok(FailoverState::Unavailable);
        }

        let nodes = self.get_nodes().await?;
        if nodes.offline.is_empty() {
            Ok(FailoverState::Nominal)
        } else {
            warn!(offline = ?nodes.offline, "Resources serving with nodes offline");
            Ok(FailoverState::FailedOver {
                offline: nodes.offline,
            })
        }
    }

    async fn is_available(&self) -> bool {
        let mut available = true;
        for agent in &self.agents {
            if !agent.is_available().await {
                warn!(agent = agent.name(), "Resource agent not available");
                available = false;
            }
        }
        available
    }

    async fn get_nodes(&self) -> Result<NodeList> {
        self.backend.list_nodes().await
    }

    async fn get_status(&self) -> FrameworkStatus {
        self.backend.cluster_status().await.status
    }

    async fn make_node_active(&self, node: &str) -> Result<NodeTransition> {
        self.set_mode(node, NodeMode::Active).await
    }

    async fn make_node_passive(&self, node: &str) -> Result<NodeTransition> {
        self.set_mode(node, NodeMode::Passive).await
    }
}
