use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use postbranch_core::catalog::CatalogError;
use postbranch_core::orchestrator::OrchestratorError;
use postbranch_core::pg::PgError;

/// Every response body, success or failure, takes this shape. List
/// endpoints always serialize an empty list as `[]`, never `null`, because
/// `data` itself is never optional here — only `errors` is.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    pub errors: Option<Vec<String>>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { data, errors: None }
    }
}

/// The control API's single error type: an orchestrator error plus the
/// status code it should be reported under (§7's error policy table).
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope { data: serde_json::Value::Null, errors: Some(vec![self.message]) };
        (self.status, Json(body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::DuplicateRepo(..) | OrchestratorError::SizeTooSmall { .. } => StatusCode::BAD_REQUEST,
            OrchestratorError::Pg(PgError::NotSuperuser | PgError::NoReplicationPrivilege) => StatusCode::BAD_REQUEST,
            OrchestratorError::Pg(PgError::Db(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::BranchNotFound(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::CannotCloseMain | OrchestratorError::BranchAlreadyClosed(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<PgError> for ApiError {
    fn from(err: PgError) -> Self {
        let status = match &err {
            PgError::NotSuperuser | PgError::NoReplicationPrivilege => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let status = match &err {
            CatalogError::RepoNotFound(_) | CatalogError::PoolNotFound(_) | CatalogError::BranchNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CatalogError::DuplicateRepo(..) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}
