use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use skiff_common::{
    Application, Artifact, ClusterStatus, InputType, Model, RegistryError, VersionHealth,
};

use crate::handlers::error_response;
use crate::state::AppState;

/// Admin-facing wrapper that maps registry errors to HTTP statuses.
pub struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::AlreadyExists(_)
            | RegistryError::VersionExists { .. }
            | RegistryError::InUse { .. } => StatusCode::CONFLICT,
            RegistryError::TypeMismatch { .. } | RegistryError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
        };
        error_response(status, self.0.code(), &self.0.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── applications ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterApplication {
    pub name: String,
    pub input_type: InputType,
    pub default_output: String,
    pub slo_micros: i64,
}

#[derive(Debug, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    pub linked_model: Option<String>,
}

pub async fn register_application(
    State(st): State<AppState>,
    Json(req): Json<RegisterApplication>,
) -> ApiResult<impl IntoResponse> {
    let app = st.registry.register_application(
        &req.name,
        req.input_type,
        &req.default_output,
        req.slo_micros,
    )?;
    st.sync_application(&app.name).await;
    Ok((StatusCode::CREATED, Json(app)))
}

pub async fn list_applications(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.registry.applications())
}

pub async fn get_application(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ApplicationView>> {
    let application = st
        .registry
        .application(&name)
        .ok_or_else(|| RegistryError::not_found("application", &name))?;
    Ok(Json(ApplicationView {
        linked_model: st.registry.linked_model(&name),
        application,
    }))
}

pub async fn deregister_application(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Application>> {
    let app = st.registry.deregister_application(&name)?;
    st.sync_link(&name).await;
    st.sync_application(&name).await;
    Ok(Json(app))
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub model: String,
}

pub async fn link_application(
    State(st): State<AppState>,
    Path(app): Path<String>,
    Json(req): Json<LinkRequest>,
) -> ApiResult<impl IntoResponse> {
    let previous = st.registry.link(&app, &req.model)?;
    st.sync_link(&app).await;
    Ok(Json(json!({
        "app": app,
        "model": req.model,
        "previous": previous,
    })))
}

pub async fn unlink_application(
    State(st): State<AppState>,
    Path(app): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let model = st.registry.unlink(&app)?;
    st.sync_link(&app).await;
    Ok(Json(json!({ "app": app, "model": model })))
}

// ── models ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ModelView {
    #[serde(flatten)]
    pub model: Model,
    pub health: Vec<VersionHealth>,
}

pub async fn list_models(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.registry.models())
}

pub async fn get_model(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ModelView>> {
    let model = st
        .registry
        .model(&name)
        .ok_or_else(|| RegistryError::not_found("model", &name))?;
    let health = model
        .versions
        .iter()
        .filter_map(|v| st.lifecycle.version_health(&model.name, &v.version))
        .collect();
    Ok(Json(ModelView { model, health }))
}

pub async fn remove_model(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Model>> {
    let model = st.registry.remove_model(&name)?;
    st.sync_model(&name).await;
    Ok(Json(model))
}

fn default_replicas() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct DeployVersion {
    pub version: String,
    pub input_type: InputType,
    pub artifact: Artifact,
    #[serde(default = "default_replicas")]
    pub replicas: i64,
}

pub async fn deploy_version(
    State(st): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DeployVersion>,
) -> ApiResult<impl IntoResponse> {
    let model = st.registry.deploy_model_version(
        &name,
        &req.version,
        req.input_type,
        req.artifact,
        req.replicas,
    )?;
    st.sync_model(&name).await;
    Ok((StatusCode::CREATED, Json(model)))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveVersion {
    pub version: String,
}

pub async fn set_active_version(
    State(st): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetActiveVersion>,
) -> ApiResult<Json<Model>> {
    let model = st.registry.set_active_version(&name, &req.version)?;
    st.sync_model(&name).await;
    Ok(Json(model))
}

#[derive(Debug, Deserialize)]
pub struct SetReplicas {
    pub replicas: i64,
}

/// Scaling is asynchronous; the response reflects the recorded target.
pub async fn set_replicas(
    State(st): State<AppState>,
    Path((name, version)): Path<(String, String)>,
    Json(req): Json<SetReplicas>,
) -> ApiResult<impl IntoResponse> {
    let model = st
        .registry
        .set_replica_count(&name, &version, req.replicas)?;
    st.sync_model(&name).await;
    Ok((StatusCode::ACCEPTED, Json(model)))
}

// ── cluster ────────────────────────────────────────────────────────────

pub async fn list_replicas(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.lifecycle.replicas())
}

pub async fn cluster_status(State(st): State<AppState>) -> impl IntoResponse {
    Json(ClusterStatus {
        applications: st.registry.applications(),
        links: st.registry.links(),
        versions: st.lifecycle.version_healths(),
        replicas: st.lifecycle.replicas(),
    })
}
