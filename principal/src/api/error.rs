use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use models::ControlPlaneError;
use serde::Serialize;

/// Small JSON envelope returned for every non-2xx response. `kind` is the
/// `ControlPlaneError` variant name, `reason` a machine-stable short code,
/// `message` the human-readable text (never a stack trace -- see `Internal`).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub status: u16,
    pub message: String,
    pub reason: &'static str,
    pub code: String,
}

/// Maps the shared error taxonomy to its HTTP status, matching §7 exactly.
pub fn status_for(err: &ControlPlaneError) -> StatusCode {
    match err {
        ControlPlaneError::NotFound(_) => StatusCode::NOT_FOUND,
        ControlPlaneError::AlreadyExists(_) => StatusCode::CONFLICT,
        ControlPlaneError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ControlPlaneError::InsufficientResources { .. } => StatusCode::CONFLICT,
        ControlPlaneError::NoFeasibleNode(_) => StatusCode::CONFLICT,
        ControlPlaneError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ControlPlaneError::RuntimeFailure(_) => StatusCode::OK,
        ControlPlaneError::Cancelled(_) => StatusCode::from_u16(499).unwrap(),
        ControlPlaneError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_of(err: &ControlPlaneError) -> &'static str {
    match err {
        ControlPlaneError::NotFound(_) => "NotFound",
        ControlPlaneError::AlreadyExists(_) => "AlreadyExists",
        ControlPlaneError::InvalidInput(_) => "InvalidInput",
        ControlPlaneError::InsufficientResources { .. } => "InsufficientResources",
        ControlPlaneError::NoFeasibleNode(_) => "NoFeasibleNode",
        ControlPlaneError::StoreUnavailable(_) => "StoreUnavailable",
        ControlPlaneError::RuntimeFailure(_) => "RuntimeFailure",
        ControlPlaneError::Cancelled(_) => "Cancelled",
        ControlPlaneError::Internal { .. } => "Internal",
    }
}

fn reason_of(err: &ControlPlaneError) -> &'static str {
    match err {
        ControlPlaneError::NotFound(_) => "not_found",
        ControlPlaneError::AlreadyExists(_) => "already_exists",
        ControlPlaneError::InvalidInput(_) => "invalid_input",
        ControlPlaneError::InsufficientResources { .. } => "insufficient_resources",
        ControlPlaneError::NoFeasibleNode(_) => "no_feasible_node",
        ControlPlaneError::StoreUnavailable(_) => "store_unavailable",
        ControlPlaneError::RuntimeFailure(_) => "runtime_failure",
        ControlPlaneError::Cancelled(_) => "cancelled",
        ControlPlaneError::Internal { .. } => "internal",
    }
}

fn code_of(err: &ControlPlaneError) -> String {
    match err {
        ControlPlaneError::Internal { correlation_id, .. } => correlation_id.clone(),
        other => reason_of(other).to_string(),
    }
}

/// Wraps a `ControlPlaneError` so handlers can return it directly via `?`
/// and have it turn into the right status code and JSON body.
pub struct ApiError(pub ControlPlaneError);

impl From<ControlPlaneError> for ApiError {
    fn from(err: ControlPlaneError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            kind: kind_of(&self.0),
            status: status.as_u16(),
            message: self.0.to_string(),
            reason: reason_of(&self.0),
            code: code_of(&self.0),
        };
        (status, Json(body)).into_response()
    }
}
