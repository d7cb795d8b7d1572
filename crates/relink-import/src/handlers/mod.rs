//! HTTP handlers for import operations

pub mod types;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Request, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relink_core::problemdetails::{self, Problem};
use relink_import_types::{
    Application, BundleSource, Datasource, DatasourceCredentials, DraftId, ImportResult,
    ImportState, PendingReconnection, ReconnectionStatus, ValidationReport, Workspace,
    WorkspaceId,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::services::ImportServiceError;
use types::{
    AppState, CreateWorkspaceRequest, GitSourceRequest, ImportStatus, StartImportRequest,
};

/// Header carrying the caller identity
pub const USER_HEADER: &str = "x-user-id";
const ANONYMOUS: &str = "anonymous";

/// Caller identity taken from the `x-user-id` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Problem;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else {
            return Ok(Caller(ANONYMOUS.to_string()));
        };

        let user = value.to_str().map_err(|_| {
            problemdetails::new(StatusCode::BAD_REQUEST)
                .with_title("Invalid Caller")
                .with_detail(format!("{} must be visible ASCII", USER_HEADER))
        })?;
        let user = user.trim();
        if user.is_empty() {
            return Ok(Caller(ANONYMOUS.to_string()));
        }
        Ok(Caller(user.to_string()))
    }
}

/// `Json` whose rejections are answered as problem details
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Problem;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                problemdetails::new(rejection.status())
                    .with_title("Invalid Request Body")
                    .with_detail(rejection.body_text())
            })?;
        Ok(JsonBody(value))
    }
}

/// Configure routes for the import API
pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workspaces", post(create_workspace))
        .route("/workspaces/{workspace_id}/imports", post(start_import))
        .route(
            "/workspaces/{workspace_id}/applications",
            get(list_applications),
        )
        .route("/imports/{draft_id}", get(get_import_status))
        .route(
            "/imports/{draft_id}/datasources/{name}/reconnect",
            post(reconnect_datasource),
        )
        .route(
            "/imports/{draft_id}/datasources/{name}/skip",
            post(skip_datasource),
        )
        .route("/imports/{draft_id}/finalize", post(finalize_import))
        .route("/imports/{draft_id}/cancel", post(cancel_import))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_workspace,
        start_import,
        list_applications,
        get_import_status,
        reconnect_datasource,
        skip_datasource,
        finalize_import,
        cancel_import,
    ),
    components(schemas(
        Application,
        BundleSource,
        CreateWorkspaceRequest,
        Datasource,
        DatasourceCredentials,
        GitSourceRequest,
        ImportResult,
        ImportState,
        ImportStatus,
        PendingReconnection,
        ReconnectionStatus,
        StartImportRequest,
        ValidationReport,
        Workspace,
    )),
    tags(
        (name = "Imports", description = "Application bundle import and datasource reconnection")
    )
)]
pub struct ImportApiDoc;

/// Create a workspace
#[utoipa::path(
    post,
    path = "/workspaces",
    tag = "Imports",
    request_body = CreateWorkspaceRequest,
    responses(
        (status = 201, description = "Workspace created", body = Workspace),
        (status = 400, description = "Invalid request"),
    )
)]
async fn create_workspace(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, Problem> {
    let workspace = state
        .import_orchestrator
        .create_workspace(&request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

/// Upload a bundle and start importing it
#[utoipa::path(
    post,
    path = "/workspaces/{workspace_id}/imports",
    tag = "Imports",
    request_body = StartImportRequest,
    params(("workspace_id" = String, Path, description = "Destination workspace")),
    responses(
        (status = 201, description = "Import started", body = ImportStatus),
        (status = 400, description = "Malformed or invalid bundle"),
        (status = 404, description = "Workspace not found"),
        (status = 409, description = "Caller already has an import in progress"),
    )
)]
async fn start_import(
    Caller(user): Caller,
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<WorkspaceId>,
    JsonBody(request): JsonBody<StartImportRequest>,
) -> Result<impl IntoResponse, Problem> {
    let payload = serde_json::to_vec(&request.bundle)
        .map_err(|e| ImportServiceError::Validation(e.to_string()))?;

    let status = state
        .import_orchestrator
        .start_import(&user, workspace_id, &payload, request.source())
        .await?;
    Ok((StatusCode::CREATED, Json(status)))
}

/// List visible applications of a workspace
#[utoipa::path(
    get,
    path = "/workspaces/{workspace_id}/applications",
    tag = "Imports",
    params(("workspace_id" = String, Path, description = "Workspace")),
    responses(
        (status = 200, description = "Applications", body = Vec<Application>),
        (status = 404, description = "Workspace not found"),
    )
)]
async fn list_applications(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<WorkspaceId>,
) -> Result<impl IntoResponse, Problem> {
    let applications = state
        .import_orchestrator
        .list_applications(workspace_id)
        .await?;
    Ok(Json(applications))
}

/// Get import status
#[utoipa::path(
    get,
    path = "/imports/{draft_id}",
    tag = "Imports",
    params(("draft_id" = String, Path, description = "Import (draft application) ID")),
    responses(
        (status = 200, description = "Import status", body = ImportStatus),
        (status = 404, description = "Import not found"),
    )
)]
async fn get_import_status(
    Caller(user): Caller,
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<DraftId>,
) -> Result<impl IntoResponse, Problem> {
    let status = state.import_orchestrator.status(&user, draft_id).await?;
    Ok(Json(status))
}

/// Test credentials for a datasource and persist it
#[utoipa::path(
    post,
    path = "/imports/{draft_id}/datasources/{name}/reconnect",
    tag = "Imports",
    request_body = DatasourceCredentials,
    params(
        ("draft_id" = String, Path, description = "Import (draft application) ID"),
        ("name" = String, Path, description = "Datasource name from the bundle"),
    ),
    responses(
        (status = 200, description = "Datasource reconnected", body = Datasource),
        (status = 404, description = "Import or datasource not found"),
        (status = 409, description = "Name taken by a datasource of another type, or import no longer resolving"),
        (status = 422, description = "Connection test failed"),
    )
)]
async fn reconnect_datasource(
    Caller(user): Caller,
    State(state): State<Arc<AppState>>,
    Path((draft_id, name)): Path<(DraftId, String)>,
    JsonBody(credentials): JsonBody<DatasourceCredentials>,
) -> Result<impl IntoResponse, Problem> {
    let datasource = state
        .import_orchestrator
        .reconnect(&user, draft_id, &name, credentials)
        .await?;
    Ok(Json(datasource))
}

/// Leave a datasource unconnected
#[utoipa::path(
    post,
    path = "/imports/{draft_id}/datasources/{name}/skip",
    tag = "Imports",
    params(
        ("draft_id" = String, Path, description = "Import (draft application) ID"),
        ("name" = String, Path, description = "Datasource name from the bundle"),
    ),
    responses(
        (status = 200, description = "Datasource skipped", body = PendingReconnection),
        (status = 404, description = "Import or datasource not found"),
        (status = 409, description = "Datasource already resolved, or import no longer resolving"),
    )
)]
async fn skip_datasource(
    Caller(user): Caller,
    State(state): State<Arc<AppState>>,
    Path((draft_id, name)): Path<(DraftId, String)>,
) -> Result<impl IntoResponse, Problem> {
    let record = state
        .import_orchestrator
        .skip(&user, draft_id, &name)
        .await?;
    Ok(Json(record))
}

/// Finalize an import
#[utoipa::path(
    post,
    path = "/imports/{draft_id}/finalize",
    tag = "Imports",
    params(("draft_id" = String, Path, description = "Import (draft application) ID")),
    responses(
        (status = 200, description = "Application created", body = ImportResult),
        (status = 404, description = "Import not found"),
        (status = 409, description = "Datasources still unresolved, or import already ended"),
    )
)]
async fn finalize_import(
    Caller(user): Caller,
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<DraftId>,
) -> Result<impl IntoResponse, Problem> {
    let result = state.import_orchestrator.finalize(&user, draft_id).await?;
    Ok(Json(result))
}

/// Cancel an import and discard its draft
#[utoipa::path(
    post,
    path = "/imports/{draft_id}/cancel",
    tag = "Imports",
    params(("draft_id" = String, Path, description = "Import (draft application) ID")),
    responses(
        (status = 200, description = "Import cancelled", body = ImportStatus),
        (status = 404, description = "Import not found"),
        (status = 409, description = "Import already ended"),
    )
)]
async fn cancel_import(
    Caller(user): Caller,
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<DraftId>,
) -> Result<impl IntoResponse, Problem> {
    let status = state.import_orchestrator.cancel(&user, draft_id).await?;
    Ok(Json(status))
}
