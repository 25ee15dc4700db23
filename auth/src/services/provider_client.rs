use std::time::Duration;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenUrl};
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use authgate_config::ProviderSettings;
use authgate_models::Provider;
use authgate_observability::{preview, secret_fingerprint};

const USER_AGENT: &str = "auth-gateway";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("access denied by user: {0}")]
    Denied(String),
    #[error("callback is missing the authorization code")]
    MissingCode,
    #[error("failed to obtain access token: {0}")]
    TokenExchange(String),
    #[error("provider request timed out")]
    Timeout,
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("invalid provider configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout
        } else if error.is_decode() {
            ProviderError::InvalidResponse(error.to_string())
        } else {
            ProviderError::Transport(error.to_string())
        }
    }
}

/// Query parameters the provider appends when redirecting back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Outcome of the code exchange and profile fetch.
///
/// Both fields may be absent: a provider can answer without error and still
/// hand back no user.
#[derive(Debug, Default)]
pub struct ProviderResponse {
    pub error: Option<ProviderError>,
    pub profile: Option<Value>,
}

impl ProviderResponse {
    pub fn profile(profile: Value) -> Self {
        Self { error: None, profile: Some(profile) }
    }

    pub fn failed(error: ProviderError) -> Self {
        Self { error: Some(error), profile: None }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Talks to one OAuth provider on behalf of the handshake controller.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Consent page URL carrying `state` and the requested scopes.
    fn authorization_url(&self, scopes: &[String], state: &str) -> Result<Url, ProviderError>;

    /// Exchange the callback code and fetch the raw profile. Never panics or
    /// returns early; every failure is reported inside the response.
    async fn fetch_profile(&self, params: &CallbackParams) -> ProviderResponse;
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    /// GitHub only: listing used when the profile has no public email.
    pub emails_url: Option<String>,
}

impl ProviderEndpoints {
    pub fn google() -> Self {
        Self {
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            profile_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            emails_url: None,
        }
    }

    pub fn github() -> Self {
        Self {
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            profile_url: "https://api.github.com/user".to_string(),
            emails_url: Some("https://api.github.com/user/emails".to_string()),
        }
    }

    pub fn for_provider(provider: Provider) -> Option<Self> {
        match provider {
            Provider::Google => Some(Self::google()),
            Provider::GitHub => Some(Self::github()),
            Provider::Local => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Authorization-code client over HTTPS.
pub struct HttpProviderClient {
    provider: Provider,
    oauth: BasicClient,
    http: Client,
    settings: ProviderSettings,
    endpoints: ProviderEndpoints,
}

impl HttpProviderClient {
    pub fn new(
        provider: Provider,
        settings: &ProviderSettings,
        endpoints: ProviderEndpoints,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let invalid = |e: url::ParseError| ProviderError::Configuration(e.to_string());

        let oauth = BasicClient::new(
            ClientId::new(settings.client_id.clone()),
            Some(ClientSecret::new(settings.client_secret.clone())),
            AuthUrl::new(endpoints.authorize_url.clone()).map_err(invalid)?,
            Some(TokenUrl::new(endpoints.token_url.clone()).map_err(invalid)?),
        )
        .set_redirect_uri(RedirectUrl::new(settings.callback_url.clone()).map_err(invalid)?);

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            provider,
            oauth,
            http,
            settings: settings.clone(),
            endpoints,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        tracing::info!(
            provider = %self.provider,
            client_id = %preview(&self.settings.client_id, 10),
            redirect_uri = %self.settings.callback_url,
            code = %secret_fingerprint(code),
            "Starting token exchange"
        );

        let params = [
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.settings.callback_url.as_str()),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(token_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(token_transport_error)?;

        if !status.is_success() {
            tracing::error!(provider = %self.provider, %status, body = %body, "Token exchange HTTP error");
            return Err(ProviderError::TokenExchange(format!("status {}: {}", status, body)));
        }

        // GitHub reports OAuth errors as 200 OK with an "error" field
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::TokenExchange(format!("invalid JSON response: {}", e)))?;

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            let description = value.get("error_description").and_then(Value::as_str).unwrap_or("");
            tracing::error!(provider = %self.provider, error, description, "Token exchange OAuth error");
            return Err(ProviderError::TokenExchange(format!("{} - {}", error, description)));
        }

        let token: TokenResponse = serde_json::from_value(value)
            .map_err(|e| ProviderError::TokenExchange(format!("could not decode response: {}", e)))?;

        tracing::info!(
            provider = %self.provider,
            token_type = ?token.token_type,
            scope = ?token.scope,
            token = %secret_fingerprint(&token.access_token),
            "Token exchange successful"
        );

        Ok(token.access_token)
    }

    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("{} returned {}", url, status)));
        }

        Ok(response.json().await?)
    }

    async fn primary_email(&self, url: &str, access_token: &str) -> Result<Option<String>, ProviderError> {
        let listing = self.get_json(url, access_token).await?;
        let emails: Vec<GitHubEmail> =
            serde_json::from_value(listing).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(emails.into_iter().find(|e| e.primary && e.verified).map(|e| e.email))
    }

    async fn try_fetch(&self, params: &CallbackParams) -> Result<Option<Value>, ProviderError> {
        if let Some(error) = params.error.as_deref() {
            let reason = params.error_description.as_deref().unwrap_or(error);
            return Err(ProviderError::Denied(reason.to_string()));
        }

        let code = params
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or(ProviderError::MissingCode)?;

        let access_token = self.exchange_code(code).await?;
        let body = self.get_json(&self.endpoints.profile_url, &access_token).await?;

        if !body.is_object() {
            tracing::warn!(provider = %self.provider, "Profile endpoint returned no user object");
            return Ok(None);
        }

        let public_email = body.get("email").and_then(Value::as_str).filter(|e| !e.is_empty()).is_some();
        let mut profile = json!({ "provider": self.provider.as_str(), "_json": body });

        if let (false, Some(url)) = (public_email, self.endpoints.emails_url.as_deref()) {
            match self.primary_email(url, &access_token).await {
                Ok(Some(email)) => profile["emails"] = json!([{ "value": email }]),
                Ok(None) => tracing::warn!(provider = %self.provider, "No verified primary email found"),
                Err(e) => tracing::warn!(provider = %self.provider, "Could not list account emails: {}", e),
            }
        }

        Ok(Some(profile))
    }
}

fn token_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::TokenExchange(error.to_string())
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn authorization_url(&self, scopes: &[String], state: &str) -> Result<Url, ProviderError> {
        let state = state.to_string();
        let (url, _) = self
            .oauth
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .url();
        Ok(url)
    }

    async fn fetch_profile(&self, params: &CallbackParams) -> ProviderResponse {
        match self.try_fetch(params).await {
            Ok(Some(profile)) => ProviderResponse::profile(profile),
            Ok(None) => ProviderResponse::empty(),
            Err(e) => ProviderResponse::failed(e),
        }
    }
}
