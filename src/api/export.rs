//! User export API endpoints
//!
//! - GET /api/v1/admin/export - The export form contract: available
//!   formats, the dispatch action name, and a fresh nonce for it
//! - POST /api/v1/admin-post - Generic action-dispatch endpoint; the
//!   export action is the only registered handler
//!
//! The export handler walks authorize -> validate -> stream: the acting
//! user must hold the configured role and present a nonce bound to the
//! export action and their session (both failures are 403). Format and
//! include_hidden are normalized silently. The body is streamed from a
//! writer task through a bounded channel; a storage error mid-stream is
//! logged and truncates the output, which the client cannot distinguish
//! from exhaustion.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::export::{write_csv, write_json, ExportFormat, ExportOptions, EXPORT_ACTION};

/// Response for the export form contract
#[derive(Debug, Serialize)]
pub struct ExportContractResponse {
    /// Dispatch action name to submit
    pub action: &'static str,
    /// Accepted format values
    pub formats: [&'static str; 2],
    /// Fresh nonce for the action, bound to the acting session
    pub nonce: String,
}

/// Form fields for the action-dispatch endpoint
#[derive(Debug, Deserialize)]
pub struct AdminPostForm {
    pub action: Option<String>,
    pub format: Option<String>,
    pub include_hidden: Option<String>,
    pub export_nonce: Option<String>,
}

/// Build the export routes (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new().route("/admin/export", get(export_contract))
}

/// Build the action-dispatch route (requires auth middleware)
pub fn admin_post_router() -> Router<AppState> {
    Router::new().route("/admin-post", post(admin_post))
}

fn authorize(state: &AppState, user: &AuthenticatedUser) -> Result<(), ApiError> {
    if !user.0.has_role(state.export_config.required_role) {
        return Err(ApiError::forbidden("You are not allowed to export users"));
    }
    Ok(())
}

/// GET /api/v1/admin/export - Export form contract
async fn export_contract(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<ExportContractResponse>, ApiError> {
    authorize(&state, &user)?;

    let nonce = state
        .nonce_service
        .create(EXPORT_ACTION, &token.0)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(ExportContractResponse {
        action: EXPORT_ACTION,
        formats: ["json", "csv"],
        nonce,
    }))
}

/// POST /api/v1/admin-post - Action dispatch
async fn admin_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(token): Extension<SessionToken>,
    Form(form): Form<AdminPostForm>,
) -> Result<Response, ApiError> {
    match form.action.as_deref() {
        Some(EXPORT_ACTION) => run_export(state, user, token, form).await,
        other => Err(ApiError::not_found(format!(
            "Unknown action: {}",
            other.unwrap_or("")
        ))),
    }
}

/// The export action handler: authorize, validate, stream.
async fn run_export(
    state: AppState,
    user: AuthenticatedUser,
    token: SessionToken,
    form: AdminPostForm,
) -> Result<Response, ApiError> {
    authorize(&state, &user)?;

    let nonce_ok = form
        .export_nonce
        .as_deref()
        .map(|nonce| state.nonce_service.verify(nonce, EXPORT_ACTION, &token.0))
        .unwrap_or(false);
    if !nonce_ok {
        return Err(ApiError::forbidden("Invalid or missing export nonce"));
    }

    let options = ExportOptions::from_form(form.format.as_deref(), form.include_hidden.as_deref());
    let filename = state.export_config.filename(options.format);

    tracing::info!(
        user_id = user.0.id,
        format = options.format.extension(),
        include_hidden = options.include_hidden,
        "Starting user export"
    );

    let (tx, rx) = mpsc::channel(16);
    let repo = state.user_repo.clone();
    let config = state.export_config.clone();
    let page_size = config.page_size;
    let include_hidden = options.include_hidden;

    match options.format {
        ExportFormat::Json => {
            tokio::spawn(async move {
                if let Err(e) = write_json(repo, page_size, include_hidden, tx).await {
                    tracing::error!("User export failed mid-stream: {:#}", e);
                }
            });
        }
        ExportFormat::Csv => {
            tokio::spawn(async move {
                if let Err(e) = write_csv(repo, config, include_hidden, tx).await {
                    tracing::error!("User export failed mid-stream: {:#}", e);
                }
            });
        }
    }

    let body = Body::from_stream(
        ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>),
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, options.format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)
        .map_err(|e| ApiError::internal_error(format!("Failed to build response: {}", e)))?;

    Ok(response.into_response())
}
