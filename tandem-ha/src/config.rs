//! Configuration management for Tandem
//!
//! Settings are layered:
//! 1. Environment variables (highest priority)
//! 2. Configuration file (TOML format)
//! 3. Default values (lowest priority)
//!
//! Resource agents and their resources are only ever declared in the file;
//! they are static for the life of the process.

use crate::backend::pcs::DEFAULT_PCS_PATH;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tandem_common::{validate_identifier, OpTiming, Resource};

/// Main configuration struct for Tandem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    /// Cluster manager invocation
    pub executor: ExecutorConfig,
    /// Staging documents for reconfiguration sessions
    pub staging: StagingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Resource agents, initialized in declaration order
    pub agents: Vec<AgentConfig>,
}

/// Cluster manager invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Path to the `pcs` binary
    pub pcs_path: String,
    /// Upper bound for a single cluster manager command
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory holding one staging document per agent
    pub dir: PathBuf,
}

/// One resource agent: a colocated, ordered group of resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub primary: String,
    pub secondary: String,
    #[serde(default = "default_score")]
    pub score: i64,
    pub resources: Vec<Resource>,
}

fn default_score() -> i64 {
    100
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pcs_path: DEFAULT_PCS_PATH.to_string(),
            timeout_secs: 60,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/tmp/tandem"),
        }
    }
}

impl TandemConfig {
    /// Load configuration from the first config file found, then apply
    /// environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("TANDEM_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/tandem/config.toml")),
            Some(PathBuf::from("./tandem.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TANDEM_PCS_PATH") {
            self.executor.pcs_path = path;
        }
        if let Ok(secs) = std::env::var("TANDEM_COMMAND_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.executor.timeout_secs = secs;
            }
        }
        if let Ok(dir) = std::env::var("TANDEM_STAGING_DIR") {
            self.staging.dir = PathBuf::from(dir);
        }

        // Logging
        if let Ok(level) = std::env::var("TANDEM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(dir) = std::env::var("TANDEM_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
        if let Ok(enabled) = std::env::var("TANDEM_FILE_LOGGING") {
            self.logging.file_logging_enabled = enabled.parse().unwrap_or(false);
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = Self {
            agents: vec![AgentConfig {
                name: "csm_resource_agent".to_string(),
                primary: "srvnode-1".to_string(),
                secondary: "srvnode-2".to_string(),
                score: default_score(),
                resources: vec![Resource {
                    name: "csm-agent".to_string(),
                    service: "csm_agent".to_string(),
                    provider: "systemd".to_string(),
                    start: OpTiming::new("0s", "60s"),
                    monitor: OpTiming::new("30s", "20s"),
                    stop: OpTiming::new("0s", "60s"),
                }],
            }],
            ..Self::default()
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.pcs_path.is_empty() {
            return Err(ConfigError::Validation("pcs path cannot be empty".to_string()));
        }
        if self.executor.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Command timeout cannot be 0".to_string(),
            ));
        }
        if self.agents.is_empty() {
            return Err(ConfigError::Validation(
                "At least one resource agent must be declared".to_string(),
            ));
        }

        let mut agent_names = HashSet::new();
        let mut resource_names = HashSet::new();

        for agent in &self.agents {
            validate_agent_name(&agent.name)?;
            if !agent_names.insert(agent.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate agent {}",
                    agent.name
                )));
            }
            if agent.primary.is_empty() || agent.secondary.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Agent {} needs a primary and a secondary node",
                    agent.name
                )));
            }
            for node in [&agent.primary, &agent.secondary] {
                validate_identifier("node", node)
                    .map_err(|e| ConfigError::Validation(format!("Agent {}: {}", agent.name, e)))?;
            }
            if agent.primary == agent.secondary {
                return Err(ConfigError::Validation(format!(
                    "Agent {} uses {} as both primary and secondary node",
                    agent.name, agent.primary
                )));
            }
            if agent.resources.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Agent {} has no resources",
                    agent.name
                )));
            }

            for resource in &agent.resources {
                validate_resource(&agent.name, resource)?;
                // A resource belongs to exactly one agent
                if !resource_names.insert(resource.name.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "Duplicate resource {}",
                        resource.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Agent names become staging file names, so they are limited to
/// `[A-Za-z0-9_.-]` and may not start with `-` or `.`.
fn validate_agent_name(name: &str) -> Result<(), ConfigError> {
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if name.is_empty() || !allowed || name.starts_with(['-', '.']) {
        return Err(ConfigError::Validation(format!("Invalid agent name {:?}", name)));
    }
    Ok(())
}

fn validate_resource(agent: &str, resource: &Resource) -> Result<(), ConfigError> {
    if resource.name.is_empty() || resource.service.is_empty() || resource.provider.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Resource {:?} of agent {} needs a name, service and provider",
            resource.name, agent
        )));
    }

    let ids = [
        ("resource", &resource.name),
        ("service", &resource.service),
        ("provider", &resource.provider),
    ];
    for (kind, id) in ids {
        validate_identifier(kind, id)
            .map_err(|e| ConfigError::Validation(format!("Agent {}: {}", agent, e)))?;
    }

    let ops = [
        ("start", &resource.start),
        ("monitor", &resource.monitor),
        ("stop", &resource.stop),
    ];
    for (op, timing) in ops {
        if timing.interval.is_empty() || timing.timeout.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Resource {} has an incomplete {} operation",
                resource.name, op
            )));
        }
    }

    Ok(())
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Config validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for tandem_common::Error {
    fn from(err: ConfigError) -> Self {
        tandem_common::Error::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[executor]
timeout_secs = 30

[staging]
dir = "/tmp/tandem-staging"

[[agents]]
name = "csm_resource_agent"
primary = "srvnode-1"
secondary = "srvnode-2"

[[agents.resources]]
name = "csm-agent"
service = "csm_agent"
provider = "systemd"
start = { interval = "0s", timeout = "60s" }
monitor = { interval = "30s", timeout = "20s" }
stop = { interval = "0s", timeout = "60s" }

[[agents.resources]]
name = "csm-web"
service = "csm_web"
provider = "systemd"
start = { interval = "0s", timeout = "60s" }
monitor = { interval = "30s", timeout = "20s" }
stop = { interval = "0s", timeout = "60s" }
"#;

    #[test]
    fn test_default_config() {
        let config = TandemConfig::default();
        assert_eq!(config.executor.pcs_path, "/usr/sbin/pcs");
        assert_eq!(config.executor.timeout(), Duration::from_secs(60));
        assert_eq!(config.staging.dir, PathBuf::from("/var/tmp/tandem"));
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_parse_agents() {
        let config = TandemConfig::from_toml(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.timeout_secs, 30);
        assert_eq!(config.executor.pcs_path, "/usr/sbin/pcs");

        let agent = &config.agents[0];
        assert_eq!(agent.score, 100);
        assert_eq!(agent.resources.len(), 2);
        assert_eq!(agent.resources[1].monitor, OpTiming::new("30s", "20s"));
    }

    #[test]
    fn test_config_validation() {
        assert!(TandemConfig::default().validate().is_err());

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.agents[0].secondary = "srvnode-1".to_string();
        assert!(config.validate().is_err());

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.agents[0].resources[1].name = "csm-agent".to_string();
        assert!(config.validate().is_err());

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        let duplicate = config.agents[0].clone();
        config.agents.push(duplicate);
        assert!(config.validate().is_err());

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.agents[0].resources[0].stop.timeout.clear();
        assert!(config.validate().is_err());

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.executor.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identifiers_validated() {
        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.agents[0].secondary = "--all".to_string();
        assert!(config.validate().is_err());

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.agents[0].resources[0].name = "-csm-agent".to_string();
        assert!(config.validate().is_err());

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.agents[0].resources[0].provider = "--force".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_agent_names_stay_inside_staging_dir() {
        for name in ["../escape", "a/b", ".hidden", "-agent", "csm agent", ""] {
            let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
            config.agents[0].name = name.to_string();
            assert!(config.validate().is_err(), "{:?} accepted", name);
        }

        let mut config = TandemConfig::from_toml(SAMPLE).unwrap();
        config.agents[0].name = "csm_resource-agent.v2".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_error() {
        let err = TandemConfig::from_toml("[[agents]]\nname = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_generate_sample_config() {
        let sample = TandemConfig::generate_sample();
        assert!(sample.contains("[executor]"));
        assert!(sample.contains("[staging]"));
        assert!(sample.contains("[logging]"));
        assert!(sample.contains("[[agents]]"));

        let parsed = TandemConfig::from_toml(&sample).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
