use log::debug;

use super::{
    model::{AppStatus, Container, ContainerStatus, ContainerStatusCode},
    port::ContainerInspector,
};
use crate::error::EngineError;

/// Maps the raw runtime state of a container to its status code.
pub fn map_state(raw_state: &str) -> ContainerStatusCode {
    match raw_state.to_ascii_lowercase().as_str() {
        "running" => ContainerStatusCode::Active,
        "exited" | "stopped" => ContainerStatusCode::Stopped,
        "restarting" => ContainerStatusCode::Restarting,
        "paused" => ContainerStatusCode::Idle,
        "dead" | "oomkilled" => ContainerStatusCode::Problematic,
        _ => ContainerStatusCode::Unknown,
    }
}

/// Status of one container. A container restarting after a non-zero exit is problematic.
pub fn classify(container: &Container) -> ContainerStatusCode {
    match map_state(&container.raw_state) {
        ContainerStatusCode::Restarting if container.exit_code != 0 => {
            ContainerStatusCode::Problematic
        }
        status => status,
    }
}

/// Reduces per-container statuses into the application status.
///
/// With no container at all the application is `Stopped` when its deployment
/// directory exists and `Unknown` otherwise.
pub fn reduce(statuses: &[ContainerStatusCode], deployed: bool) -> ContainerStatusCode {
    if statuses.is_empty() {
        return if deployed {
            ContainerStatusCode::Stopped
        } else {
            ContainerStatusCode::Unknown
        };
    }

    let count = |code: ContainerStatusCode| statuses.iter().filter(|s| **s == code).count();
    let active = count(ContainerStatusCode::Active);
    let idle = count(ContainerStatusCode::Idle);
    let stopped = count(ContainerStatusCode::Stopped);

    if count(ContainerStatusCode::Problematic) > 0 {
        ContainerStatusCode::Problematic
    } else if count(ContainerStatusCode::Restarting) > 0 {
        ContainerStatusCode::Restarting
    } else if active > 0 && stopped == 0 && idle == 0 {
        ContainerStatusCode::Active
    } else if stopped > 0 && active == 0 && idle == 0 {
        ContainerStatusCode::Stopped
    } else if idle > 0 || (active > 0 && stopped > 0) {
        ContainerStatusCode::Idle
    } else {
        ContainerStatusCode::Unknown
    }
}

/// Queries the live containers selected by `label` and folds them into an [`AppStatus`].
pub async fn aggregate(
    inspector: &(dyn ContainerInspector + Send + Sync),
    app_id: &str,
    app_name: &str,
    label: &str,
    deployed: bool,
) -> Result<AppStatus, EngineError> {
    let containers: Vec<ContainerStatus> = inspector
        .list(label)
        .await?
        .into_iter()
        .map(|container| ContainerStatus {
            status_code: classify(&container),
            container,
        })
        .collect();
    let codes: Vec<ContainerStatusCode> = containers.iter().map(|c| c.status_code).collect();
    let status_code = reduce(&codes, deployed);
    debug!(
        "app_id={} app={} containers={} status={:?}",
        app_id,
        app_name,
        containers.len(),
        status_code
    );
    Ok(AppStatus {
        app_id: app_id.to_string(),
        app_name: app_name.to_string(),
        containers,
        status_code,
    })
}
