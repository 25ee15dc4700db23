//! Environment-driven configuration for the auth gateway.
//!
//! Every value has a development default so the gateway boots on a bare
//! machine; a provider is only usable when both its client id and secret are
//! present.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_SESSION_SECRET: &str = "dev_secret_change_me";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Merge a `.env` file from the working directory into the environment, if
/// one exists. Variables already set win.
pub fn load_env_file() {
    dotenv::dotenv().ok();
}

/// OAuth client registration for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

impl ProviderSettings {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub session_secret: String,
    pub cookie_secure: bool,
    pub frontend_url: String,
    pub allowed_origins: Vec<String>,
    pub provider_timeout: Duration,
    pub session_sweep_interval: Duration,
    pub google: ProviderSettings,
    pub github: ProviderSettings,
}

impl GatewayConfig {
    /// Read the process environment. Call [`load_env_file`] first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                expected: "port number",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let session_secret = get("SESSION_SECRET").unwrap_or_else(|| {
            tracing::warn!("SESSION_SECRET not set, using the development default");
            DEFAULT_SESSION_SECRET.to_string()
        });

        let cookie_secure = match get("COOKIE_SECURE") {
            Some(raw) => parse_bool("COOKIE_SECURE", raw)?,
            None => false,
        };

        let frontend_url = get("FRONTEND_URL")
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let allowed_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let provider_timeout = Duration::from_secs(parse_secs(&get, "PROVIDER_TIMEOUT_SECS", 10)?);
        let session_sweep_interval = Duration::from_secs(parse_secs(&get, "SESSION_SWEEP_SECS", 3600)?);

        let provider = |prefix: &str, default_callback: &str| ProviderSettings {
            client_id: get(format!("{}_CLIENT_ID", prefix).as_str()).unwrap_or_default(),
            client_secret: get(format!("{}_CLIENT_SECRET", prefix).as_str()).unwrap_or_default(),
            callback_url: get(format!("{}_REDIRECT_URI", prefix).as_str())
                .unwrap_or_else(|| default_callback.to_string()),
        };

        Ok(Self {
            port,
            session_secret,
            cookie_secure,
            frontend_url,
            allowed_origins,
            provider_timeout,
            session_sweep_interval,
            google: provider("GOOGLE", "http://localhost:4001/api/auth/google/callback"),
            github: provider("GITHUB", "http://localhost:4001/api/auth/github/callback"),
        })
    }

    /// Page the browser lands on after a successful sign-in.
    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.frontend_url)
    }

    /// Page the browser is sent back to when a federated sign-in fails.
    pub fn auth_page_url(&self) -> String {
        format!("{}/auth", self.frontend_url)
    }
}

fn parse_bool(key: &'static str, raw: String) -> Result<bool, ConfigError> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            expected: "boolean",
            value: raw,
        }),
    }
}

fn parse_secs<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(ConfigError::Invalid {
                key,
                expected: "positive number of seconds",
                value: raw,
            }),
        },
        None => Ok(default),
    }
}
