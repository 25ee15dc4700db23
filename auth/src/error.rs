use actix_web::http::{header::ContentType, StatusCode};
use actix_web::{HttpResponse, ResponseError};

use authgate_models::Provider;
use crate::services::credentials::CredentialError;
use crate::services::local_auth::LocalAuthError;
use crate::services::oauth::HandshakeError;
use crate::services::sessions::SessionError;

/// Errors surfaced by the JSON endpoints. Bodies are plain text, the message
/// the browser client shows as-is.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already exists")]
    Conflict,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error(
        "{} OAuth not configured. Set {}_CLIENT_ID and {}_CLIENT_SECRET and restart.",
        .0.display_name(),
        .0.as_str().to_uppercase(),
        .0.as_str().to_uppercase()
    )]
    ProviderNotConfigured(Provider),
    #[error("Internal server error")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            ApiError::ProviderNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(detail) = self {
            tracing::error!("Request failed: {}", detail);
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(self.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::AlreadyExists => ApiError::Conflict,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LocalAuthError> for ApiError {
    fn from(err: LocalAuthError) -> Self {
        match err {
            LocalAuthError::InvalidCredentials => ApiError::InvalidCredentials,
            LocalAuthError::EmailTaken => ApiError::Conflict,
            LocalAuthError::Credentials(e) => e.into(),
            LocalAuthError::Session(e) => e.into(),
        }
    }
}

impl From<HandshakeError> for ApiError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::ProviderNotConfigured(provider) => ApiError::ProviderNotConfigured(provider),
            HandshakeError::Provider(e) => ApiError::Internal(e.to_string()),
        }
    }
}
