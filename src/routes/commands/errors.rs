use actix_web::{HttpResponse, ResponseError, http::StatusCode};

use super::super::helpers::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum WebhookError {
    #[error("Authentication error.")]
    AuthError(#[source] anyhow::Error),
    #[error("The update could not be parsed.")]
    InvalidUpdate(#[source] serde_json::Error),
}

impl std::fmt::Debug for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for WebhookError {
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        match self {
            WebhookError::AuthError(_) => HttpResponse::new(StatusCode::UNAUTHORIZED),
            WebhookError::InvalidUpdate(_) => HttpResponse::new(StatusCode::BAD_REQUEST),
        }
    }
}
