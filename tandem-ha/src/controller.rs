//! Cluster controller
//!
//! Single entry point for provisioning and operational callers. The
//! controller owns one HA framework for its whole life; there is no way to
//! swap it after construction.

use crate::agent::{Placement, ResourceAgent, ResourceGroupAgent};
use crate::backend::{ClusterBackend, PcsBackend};
use crate::config::TandemConfig;
use crate::executor::{CommandExecutor, ProcessExecutor};
use crate::framework::{ClusterFramework, FailoverState, HaFramework};
use std::sync::Arc;
use tandem_common::{FrameworkStatus, NodeList, NodeTransition, Result};
use tracing::info;

pub struct ClusterController {
    framework: Box<dyn HaFramework>,
}

impl ClusterController {
    pub fn new(framework: impl HaFramework + 'static) -> Self {
        Self {
            framework: Box::new(framework),
        }
    }

    /// Build the pcs backend, one agent per configured `[[agents]]` entry and
    /// the framework over them, running commands as child processes.
    pub fn from_config(config: &TandemConfig) -> Result<Self> {
        let executor = Arc::new(ProcessExecutor::new(config.executor.timeout()));
        Self::with_executor(config, executor)
    }

    /// Same as [`ClusterController::from_config`] with a caller-supplied executor.
    pub fn with_executor(
        config: &TandemConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        config.validate()?;

        let backend: Arc<dyn ClusterBackend> =
            Arc::new(PcsBackend::new(config.executor.pcs_path.clone(), executor));

        let agents = config
            .agents
            .iter()
            .map(|agent| {
                let placement = Placement {
                    primary: agent.primary.clone(),
                    secondary: agent.secondary.clone(),
                    score: agent.score,
                };
                Arc::new(ResourceGroupAgent::new(
                    agent.name.clone(),
                    agent.resources.clone(),
                    placement,
                    config.staging.dir.clone(),
                    backend.clone(),
                )) as Arc<dyn ResourceAgent>
            })
            .collect();

        let framework = ClusterFramework::with_agents(backend, agents)?;
        info!(agents = ?framework.agent_names(), "Cluster controller configured");
        Ok(Self::new(framework))
    }

    pub fn framework(&self) -> &dyn HaFramework {
        self.framework.as_ref()
    }

    pub async fn init(&self, force: bool) -> Result<()> {
        self.framework.init(force).await
    }

    pub async fn failover(&self) -> Result<FailoverState> {
        self.framework.failover().await
    }

    pub async fn get_status(&self) -> FrameworkStatus {
        self.framework.get_status().await
    }

    pub async fn get_nodes(&self) -> Result<NodeList> {
        self.framework.get_nodes().await
    }

    pub async fn is_available(&self) -> bool {
        self.framework.is_available().await
    }

    pub async fn make_node_active(&self, node: &str) -> Result<NodeTransition> {
        self.framework.make_node_active(node).await
    }

    pub async fn make_node_passive(&self, node: &str) -> Result<NodeTransition> {
        self.framework.make_node_passive(node).await
    }
}
