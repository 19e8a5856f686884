//! Pacemaker backend driven through the `pcs` command line tool

use super::{ClusterBackend, Directive, StatusReport};
use crate::executor::{CommandExecutor, CommandLine};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tandem_common::{Error, FrameworkStatus, NodeList, NodeMode, NodeTarget, Result};
use tracing::{debug, info, warn};

pub const DEFAULT_PCS_PATH: &str = "/usr/sbin/pcs";

/// `pcs` backend
pub struct PcsBackend {
    pcs: String,
    executor: Arc<dyn CommandExecutor>,
}

impl PcsBackend {
    pub fn new(pcs: impl Into<String>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            pcs: pcs.into(),
            executor,
        }
    }

    fn pcs(&self) -> CommandLine {
        CommandLine::new(&self.pcs)
    }

    fn staged(&self, staging: &Path) -> CommandLine {
        self.pcs().arg("-f").arg(staging.to_string_lossy())
    }

    pub fn status_command(&self) -> CommandLine {
        self.pcs().args(["cluster", "status"])
    }

    pub fn nodes_command(&self) -> CommandLine {
        self.pcs().args(["status", "nodes", "corosync"])
    }

    pub fn standby_command(&self, target: &NodeTarget, mode: NodeMode) -> CommandLine {
        let verb = match mode {
            NodeMode::Active => "unstandby",
            NodeMode::Passive => "standby",
        };
        let cmd = self.pcs().args(["node", verb]);
        match target {
            NodeTarget::All => cmd.arg("--all"),
            NodeTarget::Node(name) => cmd.arg(name.as_str()),
        }
    }

    pub fn query_command(&self, resource: &str) -> CommandLine {
        self.pcs().args(["resource", "show", resource])
    }

    pub fn delete_command(&self, resource: &str) -> CommandLine {
        self.pcs().args(["resource", "delete", resource])
    }

    /// Command line for a staged directive.
    pub fn render(&self, directive: &Directive) -> CommandLine {
        match directive {
            Directive::OpenStaging { staging } => self
                .pcs()
                .args(["cluster", "cib"])
                .arg(staging.to_string_lossy()),
            Directive::CreateResource {
                staging,
                resource,
                failure_timeout,
            } => self
                .staged(staging)
                .args(["resource", "create"])
                .arg(resource.name.as_str())
                .arg(format!("{}:{}", resource.provider, resource.service))
                .arg("meta")
                .arg(format!("failure-timeout={}", failure_timeout))
                .args(["op", "monitor"])
                .arg(format!("timeout={}", resource.monitor.timeout))
                .arg(format!("interval={}", resource.monitor.interval))
                .args(["op", "start"])
                .arg(format!("timeout={}", resource.start.timeout))
                .arg(format!("interval={}", resource.start.interval))
                .args(["op", "stop"])
                .arg(format!("timeout={}", resource.stop.timeout))
                .arg(format!("interval={}", resource.stop.interval)),
            Directive::Colocate { staging, resources } => self
                .staged(staging)
                .args(["constraint", "colocation", "set"])
                .args(resources.iter().map(String::as_str)),
            Directive::Order { staging, resources } => self
                .staged(staging)
                .args(["constraint", "order", "set"])
                .args(resources.iter().map(String::as_str)),
            Directive::Prefer {
                staging,
                resource,
                node,
                score,
            } => self
                .staged(staging)
                .args(["constraint", "location"])
                .arg(resource.as_str())
                .arg("prefers")
                .arg(format!("{}={}", node, score)),
            Directive::Push { staging } => self
                .pcs()
                .args(["cluster", "cib-push"])
                .arg(staging.to_string_lossy()),
        }
    }

    async fn run_checked(&self, cmd: &CommandLine) -> Result<()> {
        self.executor.run(cmd).await?.check(cmd)?;
        Ok(())
    }
}

/// Parse a corosync node report:
///
/// ```text
/// Corosync Nodes:
///  Online: node1 node2
///  Offline: node3
/// ```
pub fn parse_node_report(report: &str) -> Result<NodeList> {
    let mut online: Option<Vec<String>> = None;
    let mut offline: Option<Vec<String>> = None;

    for line in report.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Online:") {
            online.get_or_insert_with(|| rest.split_whitespace().map(String::from).collect());
        } else if let Some(rest) = line.strip_prefix("Offline:") {
            offline.get_or_insert_with(|| rest.split_whitespace().map(String::from).collect());
        }
    }

    let online = online
        .ok_or_else(|| Error::MalformedNodeReport("missing \"Online:\" section".to_string()))?;
    let offline = offline
        .ok_or_else(|| Error::MalformedNodeReport("missing \"Offline:\" section".to_string()))?;

    if let Some(node) = online.iter().find(|n| offline.contains(n)) {
        return Err(Error::MalformedNodeReport(format!(
            "node {} reported both online and offline",
            node
        )));
    }

    Ok(NodeList::new(online, offline))
}

#[async_trait]
impl ClusterBackend for PcsBackend {
    async fn cluster_status(&self) -> StatusReport {
        let cmd = self.status_command();
        let (status, stderr) = match self.executor.run(&cmd).await {
            Ok(output) if output.has_stderr() => {
                debug!(stderr = %output.stderr.trim(), "Cluster status reported errors");
                (FrameworkStatus::Down, output.stderr.trim().to_string())
            }
            Ok(_) => (FrameworkStatus::Up, String::new()),
            Err(e) => {
                warn!(error = %e, "Cluster status query did not complete");
                (FrameworkStatus::Down, e.to_string())
            }
        };
        StatusReport {
            status,
            command: cmd.to_string(),
            stderr,
        }
    }

    async fn list_nodes(&self) -> Result<NodeList> {
        let cmd = self.nodes_command();
        let output = self.executor.run(&cmd).await?;
        if output.exit_code != 0 {
            return Err(Error::CommandExecution {
                command: cmd.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        parse_node_report(&output.stdout)
    }

    async fn set_standby(&self, target: &NodeTarget, mode: NodeMode) -> Result<()> {
        let cmd = self.standby_command(target, mode);
        self.run_checked(&cmd).await?;
        info!(node = %target, mode = %mode, "Node maintenance mode changed");
        Ok(())
    }

    async fn query_resource(&self, resource: &str) -> Result<()> {
        self.run_checked(&self.query_command(resource)).await
    }

    async fn delete_resource(&self, resource: &str) -> Result<()> {
        self.run_checked(&self.delete_command(resource)).await?;
        info!(resource = resource, "Deleted cluster resource");
        Ok(())
    }

    async fn stage(&self, directive: &Directive) -> Result<()> {
        let cmd = self.render(directive);
        debug!(kind = directive.kind(), command = %cmd, "Staging directive");
        self.run_checked(&cmd).await
    }

    async fn apply_staged(&self, staging: &Path) -> Result<()> {
        let cmd = self.render(&Directive::Push {
            staging: staging.to_path_buf(),
        });
        self.run_checked(&cmd).await?;
        info!(staging = %staging.display(), "Pushed staged cluster configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tandem_common::{OpTiming, Resource};

    /// Replies with one fixed output and remembers what it ran.
    struct FixedExecutor {
        output: CommandOutput,
        seen: Mutex<Vec<CommandLine>>,
    }

    impl FixedExecutor {
        fn new(stdout: &str, stderr: &str, exit_code: i32) -> Arc<Self> {
            Arc::new(Self {
                output: CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_code,
                },
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for FixedExecutor {
        async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
            self.seen.lock().unwrap().push(command.clone());
            Ok(self.output.clone())
        }
    }

    fn backend(executor: Arc<FixedExecutor>) -> PcsBackend {
        PcsBackend::new("pcs", executor)
    }

    #[test]
    fn test_parse_node_report() {
        let list = parse_node_report("header\nOnline: n1 n2\nOffline: n3\n").unwrap();
        assert_eq!(list.nodes, vec!["n1", "n2", "n3"]);
        assert_eq!(list.online, vec!["n1", "n2"]);
        assert_eq!(list.offline, vec!["n3"]);
    }

    #[test]
    fn test_parse_indented_report_with_empty_offline() {
        let report = "Corosync Nodes:\n Online: srvnode-1 srvnode-2\n Offline:\n";
        let list = parse_node_report(report).unwrap();
        assert_eq!(list.online, vec!["srvnode-1", "srvnode-2"]);
        assert!(list.offline.is_empty());
        assert_eq!(list.nodes.len(), 2);
    }

    #[test]
    fn test_parse_rejects_malformed_reports() {
        assert!(matches!(
            parse_node_report("Corosync Nodes:\n Online: n1\n"),
            Err(Error::MalformedNodeReport(_))
        ));
        assert!(matches!(
            parse_node_report("header\nOnline: n1\nOffline: n1\n"),
            Err(Error::MalformedNodeReport(_))
        ));
    }

    #[test]
    fn test_render_create_resource() {
        let backend = backend(FixedExecutor::new("", "", 0));
        let directive = Directive::CreateResource {
            staging: PathBuf::from("/var/tmp/tandem/csm.cib"),
            resource: Resource {
                name: "csm_agent".to_string(),
                service: "csm_agent".to_string(),
                provider: "systemd".to_string(),
                start: OpTiming::new("0s", "60s"),
                monitor: OpTiming::new("30s", "20s"),
                stop: OpTiming::new("0s", "40s"),
            },
            failure_timeout: "10s".to_string(),
        };

        assert_eq!(
            backend.render(&directive).to_string(),
            "pcs -f /var/tmp/tandem/csm.cib resource create csm_agent systemd:csm_agent \
             meta failure-timeout=10s op monitor timeout=20s interval=30s \
             op start timeout=60s interval=0s op stop timeout=40s interval=0s"
        );
    }

    #[test]
    fn test_render_constraints() {
        let backend = backend(FixedExecutor::new("", "", 0));
        let staging = PathBuf::from("/tmp/a.cib");
        let resources = vec!["web".to_string(), "agent".to_string()];

        let colocate = Directive::Colocate {
            staging: staging.clone(),
            resources: resources.clone(),
        };
        assert_eq!(
            backend.render(&colocate).to_string(),
            "pcs -f /tmp/a.cib constraint colocation set web agent"
        );

        let order = Directive::Order {
            staging: staging.clone(),
            resources,
        };
        assert_eq!(
            backend.render(&order).to_string(),
            "pcs -f /tmp/a.cib constraint order set web agent"
        );

        let prefer = Directive::Prefer {
            staging: staging.clone(),
            resource: "web".to_string(),
            node: "n1".to_string(),
            score: 100,
        };
        assert_eq!(
            backend.render(&prefer).to_string(),
            "pcs -f /tmp/a.cib constraint location web prefers n1=100"
        );

        assert_eq!(
            backend.render(&Directive::Push { staging }).to_string(),
            "pcs cluster cib-push /tmp/a.cib"
        );
    }

    #[test]
    fn test_standby_commands() {
        let backend = backend(FixedExecutor::new("", "", 0));
        assert_eq!(
            backend.standby_command(&NodeTarget::All, NodeMode::Active).get_args(),
            ["node", "unstandby", "--all"]
        );
        assert_eq!(
            backend
                .standby_command(&NodeTarget::parse("n2").unwrap(), NodeMode::Passive)
                .get_args(),
            ["node", "standby", "n2"]
        );
    }

    #[tokio::test]
    async fn test_cluster_status_follows_stderr() {
        let up = backend(FixedExecutor::new("Cluster Status: ...", "", 0));
        let report = up.cluster_status().await;
        assert_eq!(report.status, FrameworkStatus::Up);
        assert!(report.stderr.is_empty());

        let down = backend(FixedExecutor::new(
            "",
            "Error: cluster is not currently running on this node\n",
            1,
        ));
        let report = down.cluster_status().await;
        assert_eq!(report.status, FrameworkStatus::Down);
        assert_eq!(report.command, "pcs cluster status");
        assert_eq!(report.stderr, "Error: cluster is not currently running on this node");
    }

    #[tokio::test]
    async fn test_list_nodes_fails_on_nonzero_exit() {
        let executor = FixedExecutor::new("", "Error: unable to get node status", 1);
        let err = backend(executor.clone()).list_nodes().await.unwrap_err();
        match err {
            Error::CommandExecution { command, exit_code, .. } => {
                assert_eq!(command, "pcs status nodes corosync");
                assert_eq!(exit_code, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(executor.seen.lock().unwrap().len(), 1);
    }
}
