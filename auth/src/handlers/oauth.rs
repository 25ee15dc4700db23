use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::app::AppState;
use crate::error::ApiError;
use crate::handlers::auth::retire_previous_session;
use crate::services::oauth::{HandshakeFailure, OAuthHandshakeController};
use crate::services::provider_client::CallbackParams;

fn controller_for(state: &AppState, provider: &str) -> Result<Arc<OAuthHandshakeController>, ApiError> {
    state
        .providers
        .resolve(provider)
        .ok_or_else(|| ApiError::UnknownProvider(provider.to_string()))
}

/// `GET /api/auth/{provider}`: send the browser to the provider's consent page.
pub async fn begin(provider: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let controller = controller_for(&state, &provider)?;
    let redirect = controller.begin_auth(None)?;

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, redirect.url.to_string()))
        .cookie(state.cookies.oauth_state(&redirect.state))
        .finish())
}

/// `GET /api/auth/{provider}/callback`: finish the handshake and redirect to
/// the dashboard, or back to the auth page with `error` and `msg`.
pub async fn callback(
    req: HttpRequest,
    provider: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let controller = controller_for(&state, &provider)?;
    if !controller.is_configured() {
        return Err(ApiError::ProviderNotConfigured(controller.provider()));
    }

    // a malformed query still ends in the failure redirect
    let outcome = match web::Query::<CallbackParams>::from_query(req.query_string()) {
        Ok(params) => {
            let expected_state = state.cookies.oauth_state_value(&req);
            controller
                .complete_callback(params.into_inner(), expected_state.as_deref())
                .await
        }
        Err(e) => Err(HandshakeFailure::malformed_callback(controller.provider(), e)),
    };

    let mut response = HttpResponse::Found();
    response.cookie(state.cookies.clear_oauth_state());

    match outcome {
        Ok(committed) => {
            retire_previous_session(&state, &req, &committed.session_id).await;
            Ok(response
                .insert_header((header::LOCATION, state.dashboard_url.clone()))
                .cookie(state.cookies.session(&committed.session_id))
                .finish())
        }
        Err(failure) => Ok(response
            .insert_header((header::LOCATION, failure.redirect_url(&state.auth_page_url)))
            .finish()),
    }
}
