use std::{error::Error, sync::Arc};

use anyhow::Context;
use log::info;
use ringmaster::{
    config::load_config,
    domain::{project::ProjectResolver, LifecycleService},
    infra::{
        docker::DockerContainerInspector, orchestrator::Orchestrator,
        process::TokioProcessRunner, web::router,
    },
    store::revision::RevisionStore,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Start Ringmaster - host agent for compose applications");

    let config = load_config()?;
    info!("Loaded config {:?}", config);
    let inspector = DockerContainerInspector::connect(&config.docker)?;

    let service = LifecycleService::new(
        RevisionStore::new(&config.apps_templates_path),
        ProjectResolver::new(config.compose.extension_files.clone()),
        Box::new(Orchestrator::from_config(&config, Arc::new(TokioProcessRunner))),
        Box::new(inspector),
        &config.apps_path,
    );

    let listener = TcpListener::bind(&config.http.listen)
        .await
        .with_context(|| format!("Can't listen on {}", config.http.listen))?;
    info!("Listening on {}", config.http.listen);
    axum::serve(listener, router(service)).await?;
    Ok(())
}
