use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::{json, Value};

use authgate_config::GatewayConfig;
use authgate_models::Provider;
use authgate_observability::preview;
use crate::error::ApiError;
use crate::handlers::{self, SessionCookies};
use crate::services::credentials::{CredentialStore, InMemoryCredentialStore};
use crate::services::local_auth::LocalAuthService;
use crate::services::oauth::{default_scopes, OAuthHandshakeController, ProviderRegistry};
use crate::services::provider_client::{HttpProviderClient, ProviderClient, ProviderEndpoints, ProviderError};
use crate::services::sessions::{InMemorySessionStore, SessionStore};

pub const SERVICE_NAME: &str = "auth-gateway";

/// Everything the handlers share, built once at startup.
pub struct AppState {
    pub local: LocalAuthService,
    pub sessions: Arc<dyn SessionStore>,
    pub providers: ProviderRegistry,
    pub cookies: SessionCookies,
    pub dashboard_url: String,
    pub auth_page_url: String,
}

impl AppState {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        providers: ProviderRegistry,
        cookies: SessionCookies,
        dashboard_url: impl Into<String>,
        auth_page_url: impl Into<String>,
    ) -> Self {
        Self {
            local: LocalAuthService::new(credentials, sessions.clone()),
            sessions,
            providers,
            cookies,
            dashboard_url: dashboard_url.into(),
            auth_page_url: auth_page_url.into(),
        }
    }
}

/// Wire in-memory stores and one handshake controller per federated provider.
pub fn build_state(config: &GatewayConfig) -> Result<AppState, ProviderError> {
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());

    let mut providers = ProviderRegistry::new();
    for provider in Provider::FEDERATED {
        let settings = match provider {
            Provider::GitHub => &config.github,
            _ => &config.google,
        };
        let client: Option<Arc<dyn ProviderClient>> = match ProviderEndpoints::for_provider(provider) {
            Some(endpoints) if settings.is_configured() => {
                tracing::info!(
                    "{} OAuth configured: client_id={}, callback={}",
                    provider.display_name(),
                    preview(&settings.client_id, 10),
                    settings.callback_url
                );
                Some(Arc::new(HttpProviderClient::new(
                    provider,
                    settings,
                    endpoints,
                    config.provider_timeout,
                )?))
            }
            _ => {
                tracing::warn!(
                    "{} OAuth not configured. Set {}_CLIENT_ID and {}_CLIENT_SECRET to enable it.",
                    provider.display_name(),
                    provider.as_str().to_uppercase(),
                    provider.as_str().to_uppercase()
                );
                None
            }
        };

        providers.register(OAuthHandshakeController::new(
            provider,
            client,
            default_scopes(provider),
            sessions.clone(),
        ));
    }

    Ok(AppState::new(
        credentials,
        sessions,
        providers,
        SessionCookies::new(&config.session_secret, config.cookie_secure),
        config.dashboard_url(),
        config.auth_page_url(),
    ))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api")
            .service(
                web::resource("/login")
                    .app_data(json_config("Missing credentials"))
                    .route(web::post().to(handlers::auth::login)),
            )
            .service(
                web::resource("/signup")
                    .app_data(json_config("Missing fields"))
                    .route(web::post().to(handlers::auth::signup)),
            )
            .route("/logout", web::post().to(handlers::auth::logout))
            .route("/me", web::get().to(handlers::auth::me))
            .route("/auth/{provider}", web::get().to(handlers::oauth::begin))
            .route("/auth/{provider}/callback", web::get().to(handlers::oauth::callback)),
    );
}

/// Unreadable bodies answer the same way as bodies with empty fields.
fn json_config(message: &'static str) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(move |err, _req| {
            tracing::debug!("Rejected request body: {}", err);
            ApiError::Validation(message).into()
        })
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let providers: serde_json::Map<String, Value> = Provider::FEDERATED
        .iter()
        .map(|p| (p.as_str().to_string(), Value::Bool(state.providers.is_configured(*p))))
        .collect();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "providers": providers,
        "timestamp": Utc::now(),
    }))
}
