//! Per-provider OAuth handshake.
//!
//! A handshake walks `Unconfigured → Redirecting → AwaitingCallback →
//! Exchanging → Normalizing → Committed`. Any step after the redirect can
//! fall into `Failed`, and every failure is turned into a redirect back to the
//! app's auth page rather than an HTTP error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use constant_time_eq::constant_time_eq;
use oauth2::CsrfToken;
use serde_json::Value;
use url::Url;

use authgate_models::{Identity, Provider, SessionId};
use authgate_observability::secret_fingerprint;
use crate::services::normalizer;
use crate::services::provider_client::{CallbackParams, ProviderClient, ProviderError, ProviderResponse};
use crate::services::sessions::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unconfigured,
    Redirecting,
    AwaitingCallback,
    Exchanging,
    Normalizing,
    Committed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    StateMismatch,
    ProviderExchangeFailure,
    ProviderError,
    NoUserReturned,
    SessionCommitFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("{} OAuth not configured", .0.display_name())]
    ProviderNotConfigured(Provider),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// A callback that did not end in a committed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeFailure {
    pub provider: Provider,
    pub kind: FailureKind,
    /// Last state reached before failing.
    pub failed_in: HandshakeState,
    pub message: String,
}

impl HandshakeFailure {
    /// Callback whose query string could not be read at all.
    pub fn malformed_callback(provider: Provider, detail: impl fmt::Display) -> Self {
        tracing::warn!(%provider, "Malformed callback query: {}", detail);
        Self {
            provider,
            kind: FailureKind::ProviderError,
            failed_in: HandshakeState::AwaitingCallback,
            message: format!("{} returned an invalid callback. Please try again.", provider.display_name()),
        }
    }

    /// Value of the `error` query parameter on the failure redirect.
    pub fn tag(&self) -> &'static str {
        match self.kind {
            FailureKind::SessionCommitFailure => "session",
            _ => self.provider.as_str(),
        }
    }

    pub fn redirect_url(&self, auth_page: &str) -> String {
        format!(
            "{}?error={}&msg={}",
            auth_page,
            self.tag(),
            urlencoding::encode(&self.message)
        )
    }
}

impl fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} after {:?}: {}", self.kind, self.failed_in, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: Url,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct CommittedSession {
    pub session_id: SessionId,
    pub identity: Identity,
}

pub fn default_scopes(provider: Provider) -> Vec<String> {
    let scopes: &[&str] = match provider {
        Provider::Google => &["profile", "email"],
        Provider::GitHub => &["user:email"],
        Provider::Local => &[],
    };
    scopes.iter().map(|s| s.to_string()).collect()
}

/// Reduce a provider response to a raw profile or a classified failure.
/// An error wins even when a profile came back with it.
pub fn classify(provider: Provider, response: ProviderResponse) -> Result<Value, (FailureKind, String)> {
    match (response.error, response.profile) {
        (Some(ProviderError::TokenExchange(detail)), _) => {
            tracing::error!(%provider, detail = %detail, "Token exchange failed");
            Err((
                FailureKind::ProviderExchangeFailure,
                format!(
                    "Failed to obtain access token. Please check your {} OAuth app credentials and callback URL.",
                    provider.display_name()
                ),
            ))
        }
        (Some(error), _) => Err((
            FailureKind::ProviderError,
            format!("{} authentication failed: {}", provider.display_name(), error),
        )),
        (None, Some(profile)) if !profile.is_null() => Ok(profile),
        (None, _) => Err((
            FailureKind::NoUserReturned,
            format!("No user returned from {}", provider.display_name()),
        )),
    }
}

struct Progress {
    provider: Provider,
    state: HandshakeState,
}

impl Progress {
    fn start(provider: Provider, state: HandshakeState) -> Self {
        Self { provider, state }
    }

    fn advance(&mut self, next: HandshakeState) {
        tracing::debug!(provider = %self.provider, from = ?self.state, to = ?next, "Handshake transition");
        self.state = next;
    }

    fn fail(&self, kind: FailureKind, message: impl Into<String>) -> HandshakeFailure {
        let failure = HandshakeFailure {
            provider: self.provider,
            kind,
            failed_in: self.state,
            message: message.into(),
        };
        tracing::warn!(provider = %self.provider, to = ?HandshakeState::Failed, "Handshake failed: {}", failure);
        failure
    }
}

pub struct OAuthHandshakeController {
    provider: Provider,
    client: Option<Arc<dyn ProviderClient>>,
    scopes: Vec<String>,
    sessions: Arc<dyn SessionStore>,
}

impl OAuthHandshakeController {
    /// `client` is `None` for a provider without credentials; the gate is
    /// fixed for the controller's lifetime.
    pub fn new(
        provider: Provider,
        client: Option<Arc<dyn ProviderClient>>,
        scopes: Vec<String>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            provider,
            client,
            scopes,
            sessions,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn initial_state(&self) -> HandshakeState {
        if self.is_configured() {
            HandshakeState::Redirecting
        } else {
            HandshakeState::Unconfigured
        }
    }

    pub fn begin_auth(&self, requested_scopes: Option<&[String]>) -> Result<AuthorizationRedirect, HandshakeError> {
        let client = self
            .client
            .as_ref()
            .ok_or(HandshakeError::ProviderNotConfigured(self.provider))?;

        let scopes = requested_scopes
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or(self.scopes.as_slice());
        let state = CsrfToken::new_random().secret().clone();

        let mut progress = Progress::start(self.provider, HandshakeState::Redirecting);
        let url = client.authorization_url(scopes, &state)?;
        progress.advance(HandshakeState::AwaitingCallback);

        tracing::info!(provider = %self.provider, scopes = ?scopes, "Redirecting to provider consent page");
        Ok(AuthorizationRedirect { url, state })
    }

    /// Finish the handshake. Success is only reported once the new session
    /// has been written and read back from the store.
    pub async fn complete_callback(
        &self,
        params: CallbackParams,
        expected_state: Option<&str>,
    ) -> Result<CommittedSession, HandshakeFailure> {
        let mut progress = Progress::start(self.provider, self.initial_state());
        let client = match &self.client {
            Some(client) => client,
            None => {
                return Err(progress.fail(
                    FailureKind::ProviderError,
                    format!("{} OAuth not configured", self.provider.display_name()),
                ))
            }
        };

        progress.advance(HandshakeState::AwaitingCallback);
        if !state_matches(params.state.as_deref(), expected_state) {
            return Err(progress.fail(
                FailureKind::StateMismatch,
                "Sign-in request expired or was tampered with. Please try again.",
            ));
        }

        progress.advance(HandshakeState::Exchanging);
        let response = client.fetch_profile(&params).await;
        let raw = classify(self.provider, response).map_err(|(kind, message)| progress.fail(kind, message))?;

        progress.advance(HandshakeState::Normalizing);
        let identity = normalizer::normalize(self.provider, &raw);
        if identity.picture.is_none() {
            tracing::warn!(provider = %self.provider, user_id = %identity.id, "No profile picture found in provider profile");
            tracing::debug!(provider = %self.provider, profile = %raw, "Raw provider profile");
        }

        let session_id = self.commit(&identity).await.map_err(|message| {
            progress.fail(FailureKind::SessionCommitFailure, message)
        })?;
        progress.advance(HandshakeState::Committed);

        tracing::info!(
            provider = %self.provider,
            user_id = %identity.id,
            session = %secret_fingerprint(session_id.as_str()),
            "OAuth sign-in complete"
        );
        Ok(CommittedSession { session_id, identity })
    }

    async fn commit(&self, identity: &Identity) -> Result<SessionId, String> {
        const COMMIT_FAILED: &str = "Could not save your session. Please try again.";

        let session_id = self.sessions.create(identity.clone()).await.map_err(|e| {
            tracing::error!(provider = %self.provider, "Session create failed: {}", e);
            COMMIT_FAILED.to_string()
        })?;

        let confirmed = match self.sessions.get(&session_id).await {
            Ok(Some(session)) => session.user == *identity,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(provider = %self.provider, "Session read-back failed: {}", e);
                false
            }
        };

        if !confirmed {
            if let Err(e) = self.sessions.destroy(&session_id).await {
                tracing::error!(provider = %self.provider, "Could not discard unconfirmed session: {}", e);
            }
            return Err(COMMIT_FAILED.to_string());
        }

        Ok(session_id)
    }
}

fn state_matches(received: Option<&str>, expected: Option<&str>) -> bool {
    match (received, expected) {
        (Some(received), Some(expected)) if !expected.is_empty() => {
            constant_time_eq(received.as_bytes(), expected.as_bytes())
        }
        _ => false,
    }
}

/// Controllers for every federated provider, built once at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    controllers: HashMap<Provider, Arc<OAuthHandshakeController>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, controller: OAuthHandshakeController) {
        self.controllers.insert(controller.provider(), Arc::new(controller));
    }

    /// Controller for a path segment such as `google`. Unknown names and
    /// `local` resolve to nothing.
    pub fn resolve(&self, name: &str) -> Option<Arc<OAuthHandshakeController>> {
        let provider: Provider = name.parse().ok()?;
        self.controllers.get(&provider).cloned()
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.controllers
            .get(&provider)
            .map(|c| c.is_configured())
            .unwrap_or(false)
    }
}
