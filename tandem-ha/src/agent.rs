//! Resource agents
//!
//! A resource agent owns an ordered group of resources that are colocated,
//! started in declaration order and share one location preference.
//! Reconfiguration goes through a [`ReconfigSession`]: directives are
//! accumulated against a staging copy of the cluster configuration and
//! pushed in one step by [`ResourceGroupAgent::commit`], so a partially
//! configured group never becomes live.

use crate::backend::{ClusterBackend, Directive, FAILURE_TIMEOUT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_common::{Error, Resource, Result};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

/// Observed state of an agent's resources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Available, // every resource is defined
    Absent,    // no resource is defined
    Partial { missing: Vec<String> },
}

/// Capabilities every resource agent provides to the HA framework
#[async_trait]
pub trait ResourceAgent: Send + Sync {
    fn name(&self) -> &str;

    fn resources(&self) -> &[Resource];

    /// Bring the agent's resources under management.
    async fn init(&self, force: bool) -> Result<()>;

    /// Probe every resource, even after one is found missing.
    async fn get_state(&self) -> AgentState;

    /// Whether the whole resource group is defined in the cluster.
    async fn is_available(&self) -> bool;
}

/// Location preference shared by all resources of an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub primary: String,
    pub secondary: String,
    pub score: i64,
}

/// Uncommitted reconfiguration of one agent.
///
/// Holds the agent's reconfiguration lock until it is committed or dropped,
/// so at most one session per agent exists at a time.
pub struct ReconfigSession {
    agent: String,
    staging: PathBuf,
    directives: Vec<Directive>,
    _guard: OwnedMutexGuard<()>,
}

impl ReconfigSession {
    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Directives accumulated so far; the push is appended on commit.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }
}

impl std::fmt::Debug for ReconfigSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconfigSession")
            .field("agent", &self.agent)
            .field("staging", &self.staging)
            .field("directives", &self.directives.len())
            .finish()
    }
}

/// Resource agent for a colocated, ordered group of resources
pub struct ResourceGroupAgent {
    name: String,
    resources: Vec<Resource>,
    placement: Placement,
    staging_dir: PathBuf,
    backend: Arc<dyn ClusterBackend>,
    reconfig: Arc<Mutex<()>>,
}

impl ResourceGroupAgent {
    pub fn new(
        name: impl Into<String>,
        resources: Vec<Resource>,
        placement: Placement,
        staging_dir: impl Into<PathBuf>,
        backend: Arc<dyn ClusterBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            resources,
            placement,
            staging_dir: staging_dir.into(),
            backend,
            reconfig: Arc::new(Mutex::new(())),
        }
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Staging document used by this agent's sessions.
    pub fn staging_path(&self) -> PathBuf {
        self.staging_dir.join(format!("{}.cib", self.name))
    }

    fn resource_names(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.name.clone()).collect()
    }

    /// Start a reconfiguration session placing the group on `primary` or
    /// `secondary` with equal `score`. Waits for any other session of this
    /// agent to finish.
    pub async fn configure(
        &self,
        primary: &str,
        secondary: &str,
        score: i64,
    ) -> Result<ReconfigSession> {
        let guard = self.reconfig.clone().lock_owned().await;
        self.open_session(guard, primary, secondary, score).await
    }

    async fn open_session(
        &self,
        guard: OwnedMutexGuard<()>,
        primary: &str,
        secondary: &str,
        score: i64,
    ) -> Result<ReconfigSession> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;

        let staging = self.staging_path();
        let names = self.resource_names();
        let mut directives = Vec::with_capacity(3 + 3 * self.resources.len());

        directives.push(Directive::OpenStaging {
            staging: staging.clone(),
        });

        for resource in &self.resources {
            directives.push(Directive::CreateResource {
                staging: staging.clone(),
                resource: resource.clone(),
                failure_timeout: FAILURE_TIMEOUT.to_string(),
            });
        }

        directives.push(Directive::Colocate {
            staging: staging.clone(),
            resources: names.clone(),
        });
        directives.push(Directive::Order {
            staging: staging.clone(),
            resources: names.clone(),
        });

        for name in &names {
            for node in [primary, secondary] {
                directives.push(Directive::Prefer {
                    staging: staging.clone(),
                    resource: name.clone(),
                    node: node.to_string(),
                    score,
                });
            }
        }

        debug!(
            agent = %self.name,
            directives = directives.len(),
            staging = %staging.display(),
            "Prepared reconfiguration session"
        );

        Ok(ReconfigSession {
            agent: self.name.clone(),
            staging,
            directives,
            _guard: guard,
        })
    }

    /// Append the push directive and run every directive in order, stopping
    /// at the first failure. Nothing reaches the live configuration unless
    /// the push itself succeeds.
    pub async fn commit(&self, session: ReconfigSession) -> Result<()> {
        if session.agent != self.name {
            return Err(Error::InvalidConfig(format!(
                "reconfiguration session of agent {} committed to agent {}",
                session.agent, self.name
            )));
        }

        let ReconfigSession {
            staging,
            mut directives,
            _guard,
            ..
        } = session;
        directives.push(Directive::Push { staging });

        for (step, directive) in directives.iter().enumerate() {
            let result = match directive {
                Directive::Push { staging } => self.backend.apply_staged(staging).await,
                other => self.backend.stage(other).await,
            };

            if let Err(e) = result {
                error!(
                    agent = %self.name,
                    step = step,
                    kind = directive.kind(),
                    error = %e,
                    "Reconfiguration aborted"
                );
                return Err(e);
            }
        }

        info!(
            agent = %self.name,
            resources = self.resources.len(),
            "Resource configuration committed"
        );
        Ok(())
    }

    /// Delete every resource of the group; the first failure aborts.
    pub async fn delete_resources(&self) -> Result<()> {
        let _guard = self.reconfig.lock().await;
        for resource in &self.resources {
            self.backend.delete_resource(&resource.name).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceAgent for ResourceGroupAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn resources(&self) -> &[Resource] {
        &self.resources
    }

    async fn init(&self, force: bool) -> Result<()> {
        let guard = self.reconfig.clone().lock_owned().await;
        let state = self.get_state().await;

        if state == AgentState::Available && !force {
            info!(agent = %self.name, "Resources already configured");
            return Ok(());
        }

        if force {
            let missing = match &state {
                AgentState::Available => Vec::new(),
                AgentState::Absent => self.resource_names(),
                AgentState::Partial { missing } => missing.clone(),
            };
            for resource in self.resources.iter().filter(|r| !missing.contains(&r.name)) {
                self.backend.delete_resource(&resource.name).await?;
            }
        } else if let AgentState::Partial { missing } = state {
            warn!(
                agent = %self.name,
                missing = ?missing,
                "Resource group partially configured, refusing to reconfigure without force"
            );
            return Err(Error::PartiallyConfigured {
                agent: self.name.clone(),
                missing,
            });
        }

        let Placement {
            primary,
            secondary,
            score,
        } = self.placement.clone();
        let session = self.open_session(guard, &primary, &secondary, score).await?;
        self.commit(session).await
    }

    async fn get_state(&self) -> AgentState {
        let mut missing = Vec::new();
        for resource in &self.resources {
            if let Err(e) = self.backend.query_resource(&resource.name).await {
                debug!(
                    agent = %self.name,
                    resource = %resource.name,
                    error = %e,
                    "Resource probe failed"
                );
                missing.push(resource.name.clone());
            }
        }

        if missing.is_empty() {
            AgentState::Available
        } else if missing.len() == self.resources.len() {
            AgentState::Absent
        } else {
            AgentState::Partial { missing }
        }
    }

    async fn is_available(&self) -> bool {
        self.get_state().await == AgentState::Available
    }
}
