use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use serde::Serialize;

/// Error kinds the core produces (spec §7). `DeliveryFailed` never surfaces
/// through this type — it is captured into `Message::last_error` by the
/// delivery engine and never returned to an HTTP caller.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("{0}")]
    Validation(String),

    #[error("attachment too large: {size_bytes} bytes (max {max_bytes})")]
    AttachmentTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("not found")]
    NotFound,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing X-API-Key header")]
    MissingKey,
    #[error("Invalid or disabled API key")]
    InvalidKey,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for OutboxError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::AttachmentTooLarge { .. } | Self::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let Self::Internal(e) = self {
            tracing::error!(error.cause_chain = ?e, error.message = %e, "internal error");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody { error: self.to_string() })
    }
}

impl From<sqlx::Error> for OutboxError {
    fn from(e: sqlx::Error) -> Self { Self::Internal(anyhow::Error::from(e)) }
}
