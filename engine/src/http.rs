use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::conversation;
use crate::state::AppState;

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/{id}/activate", post(activate_project))
        .route("/projects/{id}/archive", post(archive_project))
        .route("/projects/{id}/messages", post(send_message))
        .route("/projects/{id}/audit/{agent_key}", get(read_audit))
        .route("/circuits", get(circuit_snapshots))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct CreateProjectInput {
    title: String,
}

async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> Result<Json<Value>, StatusCode> {
    let meta = state
        .projects
        .create(input.title)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::to_value(meta).unwrap_or(Value::Null)))
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let projects = state
        .projects
        .list()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::to_value(projects).unwrap_or(Value::Null)))
}

async fn activate_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let meta = state
        .projects
        .activate(&id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::to_value(meta).unwrap_or(Value::Null)))
}

async fn archive_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let meta = state
        .projects
        .archive(&id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::to_value(meta).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
struct SendMessageInput {
    message: String,
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SendMessageInput>,
) -> Result<Json<Value>, StatusCode> {
    let response = conversation::handle_message(&state, &id, &input.message)
        .await
        .map_err(|err| {
            tracing::error!(project_id = %id, error = %err, "conversation turn failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(serde_json::to_value(response).unwrap_or(Value::Null)))
}

async fn read_audit(
    State(state): State<AppState>,
    Path((_project_id, agent_key)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    let entries = state
        .audit
        .read_all(&agent_key)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::to_value(entries).unwrap_or(Value::Null)))
}

async fn circuit_snapshots(State(state): State<AppState>) -> Json<Value> {
    let snapshots = state.circuits.snapshots().await;
    Json(serde_json::to_value(snapshots).unwrap_or(Value::Null))
}
