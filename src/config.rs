use std::path::PathBuf;

use anyhow::{Context, Error};
use config::{Config, Environment, File};

use crate::domain::project::DEFAULT_EXTENSION_FILES;

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Root of the rendered deployments, one directory per application name.
    pub apps_path: PathBuf,
    /// Root of the versioned templates, one directory per application ID.
    pub apps_templates_path: PathBuf,
    pub orchestrator: OrchestratorKind,
    pub docker: DockerConfig,
    pub compose: ComposeConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Copy, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorKind {
    Compose,
    Swarm,
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerConfig {
    pub socket: String,
    pub binary: String,
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ComposeConfig {
    /// Extension project files, in overlay order.
    pub extension_files: Vec<String>,
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            apps_path: PathBuf::from("/var/lib/ringmaster/apps"),
            apps_templates_path: PathBuf::from("/var/lib/ringmaster/templates"),
            orchestrator: OrchestratorKind::Compose,
            docker: DockerConfig::default(),
            compose: ComposeConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_string(),
            binary: "docker".to_string(),
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            extension_files: DEFAULT_EXTENSION_FILES.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Loads the agent configuration: defaults, then `ringmaster.{toml,yaml,json}` (or
/// the file named by `RINGMASTER_CONFIG`), then `RINGMASTER_*` variables with `__`
/// separating nested keys.
pub fn load_config() -> Result<AgentConfig, Error> {
    let file = std::env::var("RINGMASTER_CONFIG").unwrap_or_else(|_| "ringmaster".to_string());
    let config = Config::builder()
        .add_source(File::with_name(&file).required(false))
        .add_source(
            Environment::with_prefix("ringmaster")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Can't load configuration")?;

    config
        .try_deserialize()
        .context("Can't deserialize AgentConfig from loaded configuration")
}
