use actix_web::{web, HttpRequest, HttpResponse};
use validator::Validate;

use authgate_models::{AuthResponse, Identity, LoginRequest, LogoutResponse, SessionId, SignupRequest};
use authgate_observability::secret_fingerprint;
use crate::app::AppState;
use crate::error::ApiError;

pub async fn login(
    request: web::Json<LoginRequest>,
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if request.validate().is_err() {
        return Err(ApiError::Validation("Missing credentials"));
    }

    let (session_id, user) = state.local.login(&request).await.map_err(|e| {
        tracing::info!("Login rejected: {}", e);
        ApiError::from(e)
    })?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(signed_in(&state, &req, session_id, user).await)
}

pub async fn signup(
    request: web::Json<SignupRequest>,
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if request.validate().is_err() {
        return Err(ApiError::Validation("Missing fields"));
    }

    let (session_id, user) = state.local.signup(&request).await?;
    Ok(signed_in(&state, &req, session_id, user).await)
}

pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    if let Some(session_id) = state.cookies.session_id(&req) {
        state.sessions.destroy(&session_id).await?;
        tracing::info!(session = %secret_fingerprint(session_id.as_str()), "User logged out");
    }

    Ok(HttpResponse::Ok()
        .cookie(state.cookies.clear_session())
        .json(LogoutResponse { success: true }))
}

pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let session_id = state.cookies.session_id(&req).ok_or(ApiError::Unauthorized)?;
    let session = state
        .sessions
        .get(&session_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(HttpResponse::Ok().json(session.user))
}

async fn signed_in(state: &AppState, req: &HttpRequest, session_id: SessionId, user: Identity) -> HttpResponse {
    retire_previous_session(state, req, &session_id).await;

    HttpResponse::Ok()
        .cookie(state.cookies.session(&session_id))
        .json(AuthResponse { success: true, user })
}

/// Drop whatever session the browser presented before a new one was
/// committed. Failures are logged; the old session then just expires.
pub(crate) async fn retire_previous_session(state: &AppState, req: &HttpRequest, current: &SessionId) {
    let previous = match state.cookies.session_id(req) {
        Some(previous) if previous != *current => previous,
        _ => return,
    };

    if let Err(e) = state.sessions.destroy(&previous).await {
        tracing::warn!(session = %secret_fingerprint(previous.as_str()), "Could not retire previous session: {}", e);
    }
}
