pub mod credentials;
pub mod local_auth;
pub mod normalizer;
pub mod oauth;
pub mod provider_client;
pub mod sessions;

pub use credentials::{CredentialStore, InMemoryCredentialStore};
pub use local_auth::LocalAuthService;
pub use oauth::{OAuthHandshakeController, ProviderRegistry};
pub use provider_client::{HttpProviderClient, ProviderClient};
pub use sessions::{session_cleanup_task, InMemorySessionStore, SessionStore};
