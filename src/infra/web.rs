use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, MethodRouter},
    Json, Router,
};
use log::error;
use serde::Deserialize;

use crate::{
    domain::{reconcile, Event, LifecycleService},
    error::{EngineError, LifecycleError},
};

type Service = Arc<LifecycleService>;

pub fn router(service: LifecycleService) -> Router {
    Router::new()
        .route("/apps", get(list_applications))
        .route(
            "/apps/:app_id",
            get(application_status).delete(delete_application),
        )
        .route("/apps/:app_id/deploy", lifecycle(Event::Deploy))
        .route("/apps/:app_id/start", lifecycle(Event::Start))
        .route("/apps/:app_id/stop", lifecycle(Event::Stop))
        .route("/apps/:app_id/restart", lifecycle(Event::Restart))
        .route("/apps/:app_id/update", lifecycle(Event::Update))
        .route("/apps/:app_id/rename", post(rename_application))
        .with_state(Arc::new(service))
}

fn status_code(e: &LifecycleError) -> StatusCode {
    match e.source {
        EngineError::NoVersions { .. } | EngineError::NotDeployed { .. } => StatusCode::NOT_FOUND,
        EngineError::AlreadyExists { .. } => StatusCode::CONFLICT,
        EngineError::PathTraversal { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(e: LifecycleError) -> (StatusCode, String) {
    error!("{:?}", e);
    (status_code(&e), e.to_string())
}

/// Runs the event on its own task: a dropped request never interrupts an operation.
async fn apply(service: Service, event: Event) -> impl IntoResponse {
    match tokio::spawn(async move { reconcile(event, &service).await }).await {
        Ok(outcome) => outcome
            .map(|_| (StatusCode::OK, "Done".to_string()))
            .map_err(failure),
        Err(e) => {
            error!("Lifecycle task aborted: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn lifecycle(event: fn(String) -> Event) -> MethodRouter<Service> {
    post(
        move |State(service): State<Service>, Path(app_id): Path<String>| async move {
            apply(service, event(app_id)).await
        },
    )
}

async fn list_applications(State(service): State<Service>) -> impl IntoResponse {
    service.list_statuses().await.map(Json).map_err(failure)
}

async fn application_status(
    State(service): State<Service>,
    Path(app_id): Path<String>,
) -> impl IntoResponse {
    service.status(&app_id).await.map(Json).map_err(failure)
}

async fn delete_application(
    State(service): State<Service>,
    Path(app_id): Path<String>,
) -> impl IntoResponse {
    apply(service, Event::Delete(app_id)).await
}

#[derive(Deserialize)]
struct RenamePayload {
    name: String,
}

async fn rename_application(
    State(service): State<Service>,
    Path(app_id): Path<String>,
    Json(payload): Json<RenamePayload>,
) -> impl IntoResponse {
    apply(
        service,
        Event::Rename {
            app_id,
            name: payload.name,
        },
    )
    .await
}
