use anyhow::Context;
use async_trait::async_trait;
use bollard::{
    container::{InspectContainerOptions, ListContainersOptions},
    secret::{ContainerSummary, Port},
    Docker, API_DEFAULT_VERSION,
};
use log::warn;
use map_macro::hash_map;

use crate::{
    config::DockerConfig,
    domain::{model::Container, port::ContainerInspector},
    error::EngineError,
};

pub struct DockerContainerInspector {
    pub docker: Docker,
}

impl DockerContainerInspector {
    pub fn connect(config: &DockerConfig) -> Result<Self, anyhow::Error> {
        let docker = Docker::connect_with_socket(&config.socket, 120, API_DEFAULT_VERSION)
            .context("Can't connect to docker socket")?;
        Ok(Self { docker })
    }

    /// Exit code and refined state of a container that is not running.
    async fn exit_details(&self, id: &str, raw_state: String) -> (String, i64) {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => {
                let state = details.state.unwrap_or_default();
                let exit_code = state.exit_code.unwrap_or_default();
                if state.oom_killed.unwrap_or(false) {
                    ("oomkilled".to_string(), exit_code)
                } else {
                    (raw_state, exit_code)
                }
            }
            Err(e) => {
                // the container may have been removed since it was listed
                warn!("Can't inspect container {}: {}", id, e);
                (raw_state, 0)
            }
        }
    }
}

#[async_trait]
impl ContainerInspector for DockerContainerInspector {
    async fn list(&self, label: &str) -> Result<Vec<Container>, EngineError> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: hash_map! {
                    "label" => vec![label]
                },
                ..Default::default()
            }))
            .await
            .map_err(|e| EngineError::Inspector {
                reason: e.to_string(),
            })?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let mut container = to_container(summary);
            if container.raw_state != "running" {
                let (raw_state, exit_code) = self
                    .exit_details(&container.id, container.raw_state.clone())
                    .await;
                container.raw_state = raw_state;
                container.exit_code = exit_code;
            }
            containers.push(container);
        }
        Ok(containers)
    }
}

fn to_container(summary: ContainerSummary) -> Container {
    let id = summary.id.unwrap_or_default();
    Container {
        name: summary
            .names
            .and_then(|names| names.first().cloned())
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_else(|| id.clone()),
        id,
        raw_state: summary.state.unwrap_or_default(),
        exit_code: 0,
        ports: summary
            .ports
            .unwrap_or_default()
            .iter()
            .map(format_port)
            .collect(),
    }
}

fn format_port(port: &Port) -> String {
    let protocol = port
        .typ
        .as_ref()
        .map(|typ| typ.to_string())
        .unwrap_or_else(|| "tcp".to_string());
    match port.public_port {
        Some(public) => format!(
            "{}:{}->{}/{}",
            port.ip.as_deref().unwrap_or("0.0.0.0"),
            public,
            port.private_port,
            protocol
        ),
        None => format!("{}/{}", port.private_port, protocol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::secret::PortTypeEnum;

    #[test]
    fn summary_to_container() {
        let summary = ContainerSummary {
            id: Some("c0ffee".to_string()),
            names: Some(vec!["/wiki-web-1".to_string()]),
            state: Some("running".to_string()),
            ports: Some(vec![
                Port {
                    ip: Some("0.0.0.0".to_string()),
                    private_port: 80,
                    public_port: Some(8080),
                    typ: Some(PortTypeEnum::TCP),
                },
                Port {
                    ip: None,
                    private_port: 5432,
                    public_port: None,
                    typ: Some(PortTypeEnum::TCP),
                },
            ]),
            ..Default::default()
        };

        let container = to_container(summary);

        assert_eq!(container.id, "c0ffee");
        assert_eq!(container.name, "wiki-web-1");
        assert_eq!(container.raw_state, "running");
        assert_eq!(container.ports, vec!["0.0.0.0:8080->80/tcp", "5432/tcp"]);
    }

    #[test]
    fn unnamed_container_uses_id() {
        let container = to_container(ContainerSummary {
            id: Some("c0ffee".to_string()),
            ..Default::default()
        });

        assert_eq!(container.name, "c0ffee");
        assert_eq!(container.raw_state, "");
        assert!(container.ports.is_empty());
    }
}
