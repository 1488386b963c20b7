use std::path::{Path, PathBuf};

use log::{debug, error};

use super::port::OrchestratorDriver;
use crate::error::EngineError;

/// Accepted base project files. Exactly one of them must exist.
pub const BASE_FILES: [&str; 2] = ["docker-compose.yml", "docker-compose.yaml"];
/// Applied last, after every extension file.
pub const OVERRIDE_FILE: &str = "docker-compose.override.yml";
/// Generated by the renderer and handed to the orchestrator.
pub const ENV_FILE: &str = ".ringmaster.env";

pub const DEFAULT_EXTENSION_FILES: [&str; 3] = [
    "docker-compose.proxy.yml",
    "docker-compose.database.yml",
    "docker-compose.monitoring.yml",
];

/// Project files found in a deployment directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectFiles {
    pub base: String,
    /// Explicit selection in overlay order. Empty lets the orchestrator discover files itself.
    pub files: Vec<String>,
}

impl ProjectFiles {
    /// Files to hand to tools with no implicit discovery.
    pub fn explicit(&self) -> Vec<String> {
        if self.files.is_empty() {
            vec![self.base.clone()]
        } else {
            self.files.clone()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProjectResolver {
    extension_files: Vec<String>,
}

impl Default for ProjectResolver {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION_FILES.iter().map(|f| f.to_string()).collect())
    }
}

impl ProjectResolver {
    pub fn new(extension_files: Vec<String>) -> Self {
        Self { extension_files }
    }

    pub fn detect(&self, dir: &Path) -> Result<ProjectFiles, EngineError> {
        let bases: Vec<&str> = BASE_FILES
            .iter()
            .copied()
            .filter(|file| dir.join(file).is_file())
            .collect();
        let base = match bases.as_slice() {
            [] => {
                return Err(EngineError::NoProjectFile {
                    dir: dir.to_path_buf(),
                })
            }
            [base] => base.to_string(),
            [first, second, ..] => {
                return Err(EngineError::AmbiguousProjectFile {
                    dir: dir.to_path_buf(),
                    first: first.to_string(),
                    second: second.to_string(),
                })
            }
        };

        let overlays: Vec<String> = self
            .extension_files
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(OVERRIDE_FILE))
            .filter(|file| dir.join(file).is_file())
            .map(str::to_string)
            .collect();

        let files = if overlays.is_empty() {
            vec![]
        } else {
            std::iter::once(base.clone()).chain(overlays).collect()
        };
        Ok(ProjectFiles { base, files })
    }

    pub fn env_file(&self, dir: &Path) -> Option<PathBuf> {
        let path = dir.join(ENV_FILE);
        path.is_file().then_some(path)
    }

    pub async fn up(
        &self,
        driver: &(dyn OrchestratorDriver + Send + Sync),
        dir: &Path,
    ) -> Result<(), EngineError> {
        let files = self.detect(dir)?;
        let env_file = self.env_file(dir);
        report("up", dir, driver.up(dir, &files, env_file.as_deref()).await)
    }

    pub async fn down(
        &self,
        driver: &(dyn OrchestratorDriver + Send + Sync),
        dir: &Path,
    ) -> Result<(), EngineError> {
        let files = self.detect(dir)?;
        let env_file = self.env_file(dir);
        report("down", dir, driver.down(dir, &files, env_file.as_deref()).await)
    }

    pub async fn restart(
        &self,
        driver: &(dyn OrchestratorDriver + Send + Sync),
        dir: &Path,
    ) -> Result<(), EngineError> {
        let files = self.detect(dir)?;
        let env_file = self.env_file(dir);
        report(
            "restart",
            dir,
            driver.restart(dir, &files, env_file.as_deref()).await,
        )
    }

    pub async fn pull(
        &self,
        driver: &(dyn OrchestratorDriver + Send + Sync),
        dir: &Path,
    ) -> Result<(), EngineError> {
        let files = self.detect(dir)?;
        let env_file = self.env_file(dir);
        report("pull", dir, driver.pull(dir, &files, env_file.as_deref()).await)
    }
}

fn report(action: &str, dir: &Path, result: Result<String, EngineError>) -> Result<(), EngineError> {
    match result {
        Ok(output) => {
            debug!("{} dir={} output:\n{}", action, dir.display(), output);
            Ok(())
        }
        Err(EngineError::DriverFailure {
            command,
            status,
            output,
        }) => {
            error!("{} dir={} failed ({}) output:\n{}", action, dir.display(), status, output);
            Err(EngineError::DriverFailure {
                command,
                status,
                output,
            })
        }
        Err(e) => Err(e),
    }
}
