use std::sync::Arc;

use chrono::Utc;
use constant_time_eq::constant_time_eq;

use authgate_models::{CredentialRecord, Identity, LoginRequest, SessionId, SignupRequest};
use crate::services::credentials::{CredentialError, CredentialStore};
use crate::services::sessions::{SessionError, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum LocalAuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email already exists")]
    EmailTaken,
    #[error(transparent)]
    Credentials(CredentialError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<CredentialError> for LocalAuthError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::AlreadyExists => LocalAuthError::EmailTaken,
            other => LocalAuthError::Credentials(other),
        }
    }
}

/// Email/password sign-in and sign-up. Each success commits one session.
pub struct LocalAuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
}

impl LocalAuthService {
    pub fn new(credentials: Arc<dyn CredentialStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { credentials, sessions }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<(SessionId, Identity), LocalAuthError> {
        let record = self
            .credentials
            .find(&request.email)
            .await?
            .ok_or(LocalAuthError::InvalidCredentials)?;

        if !constant_time_eq(record.password.as_bytes(), request.password.as_bytes()) {
            return Err(LocalAuthError::InvalidCredentials);
        }

        let identity = Identity::local(record.id, record.name, request.email.clone());
        let session_id = self.sessions.create(identity.clone()).await?;
        Ok((session_id, identity))
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<(SessionId, Identity), LocalAuthError> {
        let id = format!("u_{}", Utc::now().timestamp_millis());
        let record = CredentialRecord {
            id: id.clone(),
            name: request.name.clone(),
            password: request.password.clone(),
        };
        self.credentials.insert(&request.email, record).await?;

        let identity = Identity::local(id, request.name.clone(), request.email.clone());
        let session_id = self.sessions.create(identity.clone()).await?;
        tracing::info!(user_id = %identity.id, "Local account created");
        Ok((session_id, identity))
    }
}
