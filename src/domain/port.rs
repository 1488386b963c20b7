use std::{
    fmt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use super::{model::Container, project::ProjectFiles};
use crate::error::EngineError;

/// A single external process call.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
    pub envs: Vec<(String, String)>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessOutput {
    pub success: bool,
    pub status: String,
    /// stdout followed by stderr
    pub output: String,
}

#[async_trait]
pub trait ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, EngineError>;
}

/// Drives the external orchestrator for a project directory.
///
/// Every call blocks until the orchestrator exits. A non-zero exit is reported as
/// [`EngineError::DriverFailure`] carrying the captured output; on success the
/// captured output is returned so the caller can log it.
#[async_trait]
pub trait OrchestratorDriver {
    async fn up(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError>;

    async fn down(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError>;

    async fn restart(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError>;

    async fn pull(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError>;

    /// Label filter (`key=value`) selecting the containers of a project.
    fn project_label(&self, project: &str) -> String;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerInspector {
    async fn list(&self, label: &str) -> Result<Vec<Container>, EngineError>;
}
