use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    api::{ApiJson, Message},
    auth::{
        dto::{LoginRequest, RegisterRequest, UserView},
        services::{hash_password, is_valid_email, normalize_email, verify_password},
        session::{bind_session, cleared_session_cookie, session_id_from_headers, CurrentUser},
    },
    error::AppError,
    model::{NewUser, Role},
    state::AppState,
};

type SetCookie = [(HeaderName, String); 1];

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, SetCookie, Json<UserView>), AppError> {
    let first_name = payload.first_name.ok_or_else(|| AppError::missing("firstName"))?;
    let last_name = payload.last_name.ok_or_else(|| AppError::missing("lastName"))?;
    let email = payload.email.ok_or_else(|| AppError::missing("email"))?;
    let phone = payload.phone.ok_or_else(|| AppError::missing("phone"))?;
    let password = payload.password.ok_or_else(|| AppError::missing("password"))?;
    let role = payload.role.ok_or_else(|| AppError::missing("role"))?;

    let role: Role = role.parse().map_err(|_| {
        warn!(%role, "invalid role");
        AppError::Validation("Role must be driver or rider".into())
    })?;

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("join password hasher")??;

    let user = state
        .store
        .create_user(NewUser {
            first_name,
            last_name,
            email,
            phone,
            password_hash,
            role,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "create user rejected");
            AppError::from(e)
        })?;

    let cookie = bind_session(&state, &user).await?;

    info!(user_id = %user.id, email = %user.email, role = ?user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(UserView::from(&user)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<(SetCookie, Json<UserView>), AppError> {
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(AppError::Validation("Email and password required".into()));
    };
    let email = normalize_email(&email);

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let hash = user.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("join password verifier")??;

    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let cookie = bind_session(&state, &user).await?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(([(header::SET_COOKIE, cookie)], Json(UserView::from(&user))))
}

/// Always succeeds. The referenced session row is deleted whether or not it
/// has already expired.
#[instrument(skip(state, headers))]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (SetCookie, Json<Message>) {
    let cfg = &state.config.session;
    if let Some(session_id) = session_id_from_headers(&headers, &cfg.cookie_name) {
        match state.store.delete_session(session_id).await {
            Ok(()) => info!(%session_id, "session ended"),
            Err(e) => warn!(error = %e, %session_id, "failed to delete session"),
        }
    }

    (
        [(header::SET_COOKIE, cleared_session_cookie(cfg))],
        Message::new("Logged out successfully"),
    )
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserView>, AppError> {
    let found = state.store.find_user(user.user_id).await?.ok_or_else(|| {
        warn!(user_id = %user.user_id, "session user no longer exists");
        AppError::NotFound("User not found".into())
    })?;

    Ok(Json(UserView::from(&found)))
}
