use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authgate_auth::services::normalizer::normalize;
use authgate_auth::services::provider_client::{
    CallbackParams, HttpProviderClient, ProviderClient, ProviderEndpoints, ProviderError,
};
use authgate_config::ProviderSettings;
use authgate_models::Provider;

fn settings() -> ProviderSettings {
    ProviderSettings {
        client_id: "client-123".to_string(),
        client_secret: "secret-456".to_string(),
        callback_url: "http://localhost:4001/api/auth/github/callback".to_string(),
    }
}

fn endpoints(server: &MockServer, emails: bool) -> ProviderEndpoints {
    ProviderEndpoints {
        authorize_url: format!("{}/authorize", server.uri()),
        token_url: format!("{}/token", server.uri()),
        profile_url: format!("{}/user", server.uri()),
        emails_url: emails.then(|| format!("{}/user/emails", server.uri())),
    }
}

fn client(provider: Provider, server: &MockServer, emails: bool, timeout: Duration) -> HttpProviderClient {
    HttpProviderClient::new(provider, &settings(), endpoints(server, emails), timeout).unwrap()
}

fn code(value: &str) -> CallbackParams {
    CallbackParams {
        code: Some(value.to_string()),
        state: Some("st".to_string()),
        ..Default::default()
    }
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer",
            "scope": "user:email"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_google_profile_fetch() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-g").await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "Bearer tok-g"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "1077",
            "name": "Ada",
            "email": "ada@example.com",
            "email_verified": true,
            "picture": "https://lh3.example/ada"
        })))
        .mount(&server)
        .await;

    let response = client(Provider::Google, &server, false, Duration::from_secs(5))
        .fetch_profile(&code("c-1"))
        .await;

    assert!(response.error.is_none());
    let identity = normalize(Provider::Google, &response.profile.unwrap());
    assert_eq!(identity.id, "1077");
    assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
    assert_eq!(identity.picture.as_deref(), Some("https://lh3.example/ada?sz=400"));
}

#[tokio::test]
async fn test_github_200_error_is_token_exchange_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        })))
        .mount(&server)
        .await;

    let response = client(Provider::GitHub, &server, true, Duration::from_secs(5))
        .fetch_profile(&code("stale"))
        .await;

    match response.error {
        Some(ProviderError::TokenExchange(detail)) => assert!(detail.contains("bad_verification_code")),
        other => panic!("expected token exchange failure, got {:?}", other),
    }
    assert!(response.profile.is_none());
}

#[tokio::test]
async fn test_token_endpoint_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let response = client(Provider::Google, &server, false, Duration::from_secs(5))
        .fetch_profile(&code("c"))
        .await;

    assert!(matches!(response.error, Some(ProviderError::TokenExchange(_))));
}

#[tokio::test]
async fn test_github_private_email_uses_primary_verified() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-h").await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 583231,
            "login": "octocat",
            "name": null,
            "email": null,
            "avatar_url": "https://avatars.example/u/583231?v=4"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "old@example.com", "primary": false, "verified": true},
            {"email": "octo@example.com", "primary": true, "verified": true}
        ])))
        .mount(&server)
        .await;

    let response = client(Provider::GitHub, &server, true, Duration::from_secs(5))
        .fetch_profile(&code("c"))
        .await;

    let identity = normalize(Provider::GitHub, &response.profile.unwrap());
    assert_eq!(identity.id, "583231");
    assert_eq!(identity.name, "octocat");
    assert_eq!(identity.email.as_deref(), Some("octo@example.com"));
    assert_eq!(identity.picture.as_deref(), Some("https://avatars.example/u/583231?v=4"));
}

#[tokio::test]
async fn test_github_email_listing_failure_is_not_fatal() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-i").await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "login": "quiet"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let response = client(Provider::GitHub, &server, true, Duration::from_secs(5))
        .fetch_profile(&code("c"))
        .await;

    assert!(response.error.is_none());
    assert_eq!(normalize(Provider::GitHub, &response.profile.unwrap()).email, None);
}

#[tokio::test]
async fn test_non_object_profile_is_no_user() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-j").await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
        .mount(&server)
        .await;

    let response = client(Provider::Google, &server, false, Duration::from_secs(5))
        .fetch_profile(&code("c"))
        .await;

    assert!(response.error.is_none());
    assert!(response.profile.is_none());
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let response = client(Provider::Google, &server, false, Duration::from_millis(200))
        .fetch_profile(&code("c"))
        .await;

    assert!(matches!(response.error, Some(ProviderError::Timeout)));
}
