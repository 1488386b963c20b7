use std::{fs, path::Path, sync::Arc};

use async_trait::async_trait;
use log::info;

use crate::{
    config::{AgentConfig, OrchestratorKind},
    domain::{
        port::{Invocation, OrchestratorDriver, ProcessRunner},
        project::ProjectFiles,
    },
    error::EngineError,
    store::envfile,
};

pub type SharedRunner = Arc<dyn ProcessRunner + Send + Sync>;

/// Orchestrator backend, chosen once from the configuration.
pub enum Orchestrator {
    Compose(ComposeDriver),
    Swarm(SwarmDriver),
}

impl Orchestrator {
    pub fn from_config(config: &AgentConfig, runner: SharedRunner) -> Self {
        let binary = config.docker.binary.clone();
        match config.orchestrator {
            OrchestratorKind::Compose => Orchestrator::Compose(ComposeDriver { runner, binary }),
            OrchestratorKind::Swarm => Orchestrator::Swarm(SwarmDriver {
                compose: ComposeDriver { runner, binary },
            }),
        }
    }
}

#[async_trait]
impl OrchestratorDriver for Orchestrator {
    async fn up(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        match self {
            Orchestrator::Compose(driver) => driver.up(dir, files, env_file).await,
            Orchestrator::Swarm(driver) => driver.up(dir, files, env_file).await,
        }
    }

    async fn down(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        match self {
            Orchestrator::Compose(driver) => driver.down(dir, files, env_file).await,
            Orchestrator::Swarm(driver) => driver.down(dir).await,
        }
    }

    async fn restart(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        match self {
            Orchestrator::Compose(driver) => driver.restart(dir, files, env_file).await,
            Orchestrator::Swarm(driver) => driver.restart(dir).await,
        }
    }

    async fn pull(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        match self {
            Orchestrator::Compose(driver) => driver.pull(dir, files, env_file).await,
            // images are the same whatever deploys them
            Orchestrator::Swarm(driver) => {
                let explicit = ProjectFiles {
                    base: files.base.clone(),
                    files: files.explicit(),
                };
                driver.compose.pull(dir, &explicit, env_file).await
            }
        }
    }

    fn project_label(&self, project: &str) -> String {
        match self {
            Orchestrator::Compose(_) => format!(
                "com.docker.compose.project={}",
                compose_project_name(project)
            ),
            Orchestrator::Swarm(_) => format!("com.docker.stack.namespace={}", project),
        }
    }
}

/// Project name compose derives from a directory name.
pub fn compose_project_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn project_of(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn execute(runner: &SharedRunner, invocation: Invocation) -> Result<String, EngineError> {
    let output = runner.run(&invocation).await?;
    if output.success {
        Ok(output.output)
    } else {
        Err(EngineError::DriverFailure {
            command: invocation.to_string(),
            status: output.status,
            output: output.output,
        })
    }
}

/// `docker compose` run from the deployment directory.
pub struct ComposeDriver {
    runner: SharedRunner,
    binary: String,
}

impl ComposeDriver {
    pub fn new(runner: SharedRunner, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    fn invocation(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
        command: &[&str],
    ) -> Invocation {
        let mut args = vec!["compose".to_string()];
        if let Some(env_file) = env_file {
            args.push("--env-file".to_string());
            args.push(env_file.display().to_string());
        }
        for file in &files.files {
            args.push("-f".to_string());
            args.push(file.clone());
        }
        args.extend(command.iter().map(|arg| arg.to_string()));
        Invocation {
            program: self.binary.clone(),
            args,
            dir: dir.to_path_buf(),
            envs: vec![],
        }
    }

    pub async fn up(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        let invocation = self.invocation(dir, files, env_file, &["up", "-d", "--remove-orphans"]);
        execute(&self.runner, invocation).await
    }

    pub async fn down(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        let invocation = self.invocation(dir, files, env_file, &["down", "--remove-orphans"]);
        execute(&self.runner, invocation).await
    }

    pub async fn restart(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        let invocation = self.invocation(dir, files, env_file, &["restart"]);
        execute(&self.runner, invocation).await
    }

    pub async fn pull(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        let invocation = self.invocation(dir, files, env_file, &["pull"]);
        execute(&self.runner, invocation).await
    }
}

/// `docker stack` deployment of the project, named after the deployment directory.
pub struct SwarmDriver {
    compose: ComposeDriver,
}

impl SwarmDriver {
    pub fn new(runner: SharedRunner, binary: impl Into<String>) -> Self {
        Self {
            compose: ComposeDriver::new(runner, binary),
        }
    }

    fn docker(&self, dir: &Path, args: Vec<String>, envs: Vec<(String, String)>) -> Invocation {
        Invocation {
            program: self.compose.binary.clone(),
            args,
            dir: dir.to_path_buf(),
            envs,
        }
    }

    pub async fn up(
        &self,
        dir: &Path,
        files: &ProjectFiles,
        env_file: Option<&Path>,
    ) -> Result<String, EngineError> {
        // stack deploy has no env-file flag, variables go through the process environment
        let envs = match env_file {
            Some(path) => envfile::decode(
                &fs::read_to_string(path)
                    .map_err(EngineError::io(format!("Can't read {}", path.display())))?,
            ),
            None => vec![],
        };
        let mut args = vec!["stack".to_string(), "deploy".to_string(), "--prune".to_string()];
        for file in files.explicit() {
            args.push("-c".to_string());
            args.push(file);
        }
        args.push(project_of(dir));
        execute(&self.compose.runner, self.docker(dir, args, envs)).await
    }

    pub async fn down(&self, dir: &Path) -> Result<String, EngineError> {
        let args = vec!["stack".to_string(), "rm".to_string(), project_of(dir)];
        execute(&self.compose.runner, self.docker(dir, args, vec![])).await
    }

    pub async fn restart(&self, dir: &Path) -> Result<String, EngineError> {
        let stack = project_of(dir);
        let services = execute(
            &self.compose.runner,
            self.docker(
                dir,
                vec![
                    "stack".to_string(),
                    "services".to_string(),
                    "--format".to_string(),
                    "{{.Name}}".to_string(),
                    stack.clone(),
                ],
                vec![],
            ),
        )
        .await?;

        let mut output = String::new();
        for service in services.lines().map(str::trim).filter(|s| !s.is_empty()) {
            info!("stack={} force updating service {}", stack, service);
            let args = vec![
                "service".to_string(),
                "update".to_string(),
                "--force".to_string(),
                service.to_string(),
            ];
            output.push_str(&execute(&self.compose.runner, self.docker(dir, args, vec![])).await?);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::port::ProcessOutput;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Invocation>>,
        stdout: String,
        fail: bool,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, EngineError> {
            self.calls.lock().push(invocation.clone());
            Ok(ProcessOutput {
                success: !self.fail,
                status: if self.fail { "exit status: 1" } else { "exit status: 0" }.to_string(),
                output: self.stdout.clone(),
            })
        }
    }

    fn args(invocation: &Invocation) -> Vec<&str> {
        invocation.args.iter().map(String::as_str).collect()
    }

    fn implicit() -> ProjectFiles {
        ProjectFiles {
            base: "docker-compose.yml".to_string(),
            files: vec![],
        }
    }

    #[tokio::test]
    async fn compose_up_with_implicit_files() {
        let runner = Arc::new(RecordingRunner::default());
        let driver = ComposeDriver::new(runner.clone(), "docker");
        let dir = PathBuf::from("/srv/apps/wiki");

        driver.up(&dir, &implicit(), None).await.unwrap();

        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "docker");
        assert_eq!(calls[0].dir, dir);
        assert_eq!(args(&calls[0]), vec!["compose", "up", "-d", "--remove-orphans"]);
    }

    #[tokio::test]
    async fn compose_lists_env_file_then_files_in_order() {
        let runner = Arc::new(RecordingRunner::default());
        let driver = ComposeDriver::new(runner.clone(), "docker");
        let files = ProjectFiles {
            base: "docker-compose.yml".to_string(),
            files: vec![
                "docker-compose.yml".to_string(),
                "docker-compose.proxy.yml".to_string(),
                "docker-compose.override.yml".to_string(),
            ],
        };
        let env = PathBuf::from("/srv/apps/wiki/.ringmaster.env");

        driver
            .down(Path::new("/srv/apps/wiki"), &files, Some(&env))
            .await
            .unwrap();

        assert_eq!(
            args(&runner.calls.lock()[0]),
            vec![
                "compose",
                "--env-file",
                "/srv/apps/wiki/.ringmaster.env",
                "-f",
                "docker-compose.yml",
                "-f",
                "docker-compose.proxy.yml",
                "-f",
                "docker-compose.override.yml",
                "down",
                "--remove-orphans",
            ]
        );
    }

    #[tokio::test]
    async fn failure_carries_output() {
        let runner = Arc::new(RecordingRunner {
            stdout: "no such image: wiki:9".to_string(),
            fail: true,
            ..Default::default()
        });
        let driver = ComposeDriver::new(runner, "docker");

        let result = driver.pull(Path::new("/srv/apps/wiki"), &implicit(), None).await;

        match result {
            Err(EngineError::DriverFailure {
                command, output, ..
            }) => {
                assert_eq!(command, "docker compose pull");
                assert_eq!(output, "no such image: wiki:9");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn swarm_deploys_with_explicit_base_and_env() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("wiki");
        std::fs::create_dir_all(&dir).unwrap();
        let env = dir.join(".ringmaster.env");
        std::fs::write(&env, "PORT=8080\nTITLE=\"My wiki\"\n").unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let driver = SwarmDriver::new(runner.clone(), "docker");

        driver.up(&dir, &implicit(), Some(&env)).await.unwrap();

        let calls = runner.calls.lock();
        assert_eq!(
            args(&calls[0]),
            vec!["stack", "deploy", "--prune", "-c", "docker-compose.yml", "wiki"]
        );
        assert_eq!(
            calls[0].envs,
            vec![
                ("PORT".to_string(), "8080".to_string()),
                ("TITLE".to_string(), "My wiki".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn swarm_restart_forces_every_service() {
        let runner = Arc::new(RecordingRunner {
            stdout: "wiki_web\nwiki_db\n".to_string(),
            ..Default::default()
        });
        let driver = SwarmDriver::new(runner.clone(), "docker");

        driver.restart(Path::new("/srv/apps/wiki")).await.unwrap();

        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            args(&calls[0]),
            vec!["stack", "services", "--format", "{{.Name}}", "wiki"]
        );
        assert_eq!(args(&calls[1]), vec!["service", "update", "--force", "wiki_web"]);
        assert_eq!(args(&calls[2]), vec!["service", "update", "--force", "wiki_db"]);
    }

    #[test]
    fn labels_per_backend() {
        let runner: SharedRunner = Arc::new(RecordingRunner::default());
        let compose = Orchestrator::Compose(ComposeDriver::new(runner.clone(), "docker"));
        let swarm = Orchestrator::Swarm(SwarmDriver::new(runner, "docker"));

        assert_eq!(
            compose.project_label("My.Wiki"),
            "com.docker.compose.project=mywiki"
        );
        assert_eq!(swarm.project_label("wiki"), "com.docker.stack.namespace=wiki");
    }
}
