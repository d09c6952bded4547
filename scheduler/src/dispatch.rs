// Manual dispatch HTTP endpoint
//
// POST /dispatch   request a manual monitor run (HMAC-signed when a secret is set)
// GET  /health     liveness
// GET  /status     last completed run

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::errors::DispatchError;
use common::models::RunReport;
use common::scheduler::DispatchHandle;
use common::webhook::{validate_dispatch_signature, SIGNATURE_HEADER};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub struct DispatchState {
    pub dispatch: DispatchHandle,
    pub secret: Option<String>,
    pub last_report: Arc<RwLock<Option<RunReport>>>,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "conflict" => StatusCode::CONFLICT,
            "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<DispatchError> for ErrorResponse {
    fn from(err: DispatchError) -> Self {
        let kind = match err {
            DispatchError::InvalidSignature => "unauthorized",
            DispatchError::Busy => "conflict",
            DispatchError::Closed => "unavailable",
            DispatchError::InvalidSecret(_) => "internal_error",
        };
        ErrorResponse::new(kind, err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct DispatchAccepted {
    pub status: &'static str,
    pub trigger: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub last_run: Option<RunReport>,
}

pub fn create_router(state: DispatchState) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}

/// Health check endpoint
#[tracing::instrument]
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[tracing::instrument(skip(state, headers, body))]
pub async fn dispatch(
    State(state): State<DispatchState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ErrorResponse> {
    if let Some(secret) = &state.secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                warn!("Dispatch request without signature");
                ErrorResponse::from(DispatchError::InvalidSignature)
            })?;

        if !validate_dispatch_signature(&body, signature, secret)? {
            warn!("Dispatch request with invalid signature");
            return Err(DispatchError::InvalidSignature.into());
        }
    }

    state.dispatch.request().map_err(|e| {
        warn!(error = %e, "Manual dispatch rejected");
        ErrorResponse::from(e)
    })?;

    info!("Manual monitor run queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(DispatchAccepted {
            status: "accepted",
            trigger: "manual",
        }),
    ))
}

#[tracing::instrument(skip(state))]
pub async fn status(State(state): State<DispatchState>) -> impl IntoResponse {
    let last_run = state.last_report.read().await.clone();
    Json(StatusResponse {
        running: state.dispatch.is_busy(),
        last_run,
    })
}
