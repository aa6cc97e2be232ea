use axum::{
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::application::collaborators::CollaboratorError;

/// Error taxonomy for the request path.
///
/// Validation and not-found errors carry a message that is returned to the
/// client verbatim as plain text. Upstream failures are opaque to the client
/// and logged with request context by the pipeline.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(#[from] CollaboratorError),
}

impl RouteError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RouteError::Validation(_) => StatusCode::BAD_REQUEST,
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text sent to the client. Upstream details are never leaked.
    pub fn public_message(&self) -> String {
        match self {
            RouteError::Validation(message) | RouteError::NotFound(message) => message.clone(),
            RouteError::Upstream(_) => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        plain_text_response(self.status_code(), self.public_message())
    }
}

pub fn plain_text_response(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

/// Top-level error for startup and shutdown paths.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::LoadError),
    #[error(transparent)]
    Infra(#[from] crate::infra::InfraError),
    #[error("identity setup failed: {0}")]
    Identity(#[from] crate::identity::IdentityError),
    #[error(transparent)]
    Ledger(#[from] crate::ledger::store::LedgerStoreError),
    #[error("route registration failed: {0}")]
    Registry(#[from] crate::routing::registry::RegistryError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("{0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
