//! Command execution against the external cluster manager
//!
//! Commands are typed argument vectors, never shell strings: every node id,
//! resource name and path is passed to the child process as a single argv
//! entry.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tandem_common::{Error, Result};
use tokio::process::Command;
use tracing::{debug, warn};

/// Program plus argument list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}

/// Renders the command the way an operator would type it, quoting arguments
/// that would otherwise be split by a shell.
impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn has_stderr(&self) -> bool {
        !self.stderr.trim().is_empty()
    }

    /// Zero exit code and no error text.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.has_stderr()
    }

    /// Turn a failed run into `Error::CommandExecution` carrying the command line.
    pub fn check(self, command: &CommandLine) -> Result<Self> {
        if self.succeeded() {
            return Ok(self);
        }
        Err(Error::CommandExecution {
            command: command.to_string(),
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs cluster-manager commands. No retries happen at this layer.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput>;
}

/// Executor backed by child processes, each bounded by a timeout
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        debug!(command = %command, "Running cluster manager command");

        let mut cmd = Command::new(command.program());
        cmd.args(command.get_args())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                // Killed by a signal when there is no exit code
                let exit_code = output.status.code().unwrap_or(-1);
                Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code,
                })
            }
            Ok(Err(e)) => Err(Error::CommandSpawn {
                command: command.to_string(),
                source: e,
            }),
            Err(_) => {
                warn!(
                    command = %command,
                    timeout = ?self.timeout,
                    "Cluster manager command timed out"
                );
                Err(Error::CommandTimeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_untrusted_arguments() {
        let cmd = CommandLine::new("pcs")
            .args(["resource", "show"])
            .arg("evil; rm -rf /");
        assert_eq!(cmd.to_string(), "pcs resource show 'evil; rm -rf /'");
        assert_eq!(cmd.get_args().len(), 3);

        let cmd = CommandLine::new("pcs").arg("it's");
        assert_eq!(cmd.to_string(), r"pcs 'it'\''s'");
    }

    #[test]
    fn test_check_requires_clean_stderr() {
        let cmd = CommandLine::new("pcs").arg("status");
        let ok = CommandOutput {
            stdout: "fine".to_string(),
            ..Default::default()
        };
        assert!(ok.check(&cmd).is_ok());

        let warned = CommandOutput {
            stderr: "Error: cluster is not currently running on this node\n".to_string(),
            ..Default::default()
        };
        match warned.check(&cmd) {
            Err(Error::CommandExecution { command, exit_code, stderr }) => {
                assert_eq!(command, "pcs status");
                assert_eq!(exit_code, 0);
                assert_eq!(stderr, "Error: cluster is not currently running on this node");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let failed = CommandOutput {
            exit_code: 1,
            ..Default::default()
        };
        assert!(failed.check(&cmd).is_err());
    }

    #[tokio::test]
    async fn test_process_executor_captures_output() {
        let executor = ProcessExecutor::default();
        let cmd = CommandLine::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = executor.run(&cmd).await.unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    async fn test_process_executor_timeout() {
        let executor = ProcessExecutor::new(Duration::from_millis(100));
        let cmd = CommandLine::new("sleep").arg("5");
        let err = executor.run(&cmd).await.unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }));
    }

    #[tokio::test]
    async fn test_process_executor_spawn_failure() {
        let executor = ProcessExecutor::default();
        let cmd = CommandLine::new("/nonexistent/tandem-test-binary");
        let err = executor.run(&cmd).await.unwrap_err();
        assert!(matches!(err, Error::CommandSpawn { .. }));
    }
}
