//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tandem_common::{OpTiming, Resource, Result};
use tandem_ha::agent::{Placement, ResourceGroupAgent};
use tandem_ha::backend::PcsBackend;
use tandem_ha::executor::{CommandExecutor, CommandLine, CommandOutput};

struct Rule {
    pattern: String,
    output: CommandOutput,
}

/// Executor that records every command and answers from a rule table.
///
/// The first rule whose pattern is a substring of the rendered command
/// wins; commands matching no rule succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<CommandLine>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, pattern: &str, stdout: &str, stderr: &str, exit_code: i32) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            output: CommandOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        });
    }

    pub fn fail(&self, pattern: &str, stderr: &str) {
        self.reply(pattern, "", stderr, 1);
    }

    /// Rendered commands in execution order
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(ToString::to_string).collect()
    }

    pub fn command_lines(&self) -> Vec<CommandLine> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        let rendered = command.to_string();
        self.log.lock().unwrap().push(command.clone());

        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .find(|rule| rendered.contains(&rule.pattern))
            .map(|rule| rule.output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}

pub fn resource(name: &str) -> Resource {
    Resource {
        name: name.to_string(),
        service: format!("{}_svc", name),
        provider: "systemd".to_string(),
        start: OpTiming::new("0s", "60s"),
        monitor: OpTiming::new("30s", "20s"),
        stop: OpTiming::new("0s", "40s"),
    }
}

pub fn placement() -> Placement {
    Placement {
        primary: "n1".to_string(),
        secondary: "n2".to_string(),
        score: 100,
    }
}

pub fn group_agent(
    executor: &Arc<ScriptedExecutor>,
    staging_dir: &Path,
    name: &str,
    resources: &[&str],
) -> ResourceGroupAgent {
    let backend = Arc::new(PcsBackend::new("pcs", executor.clone()));
    ResourceGroupAgent::new(
        name,
        resources.iter().map(|r| resource(r)).collect(),
        placement(),
        staging_dir,
        backend,
    )
}
