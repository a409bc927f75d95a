use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::SessionConfig,
    error::AppError,
    model::{Role, User},
    state::AppState,
};

/// The user bound to the caller's session.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub role: Role,
}

/// A [`CurrentUser`] whose role is `driver`.
#[derive(Debug)]
pub struct DriverUser(pub CurrentUser);

/// A [`CurrentUser`] whose role is `rider`.
#[derive(Debug)]
pub struct RiderUser(pub CurrentUser);

/// Reads the session id out of the `Cookie` header(s).
pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| Cookie::split_parse(v))
        .filter_map(Result::ok)
        .find(|c| c.name() == cookie_name)
        .and_then(|c| Uuid::parse_str(c.value_trimmed()).ok())
}

fn build_cookie(cfg: &SessionConfig, value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((cfg.cookie_name.clone(), value))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(cfg.secure)
        .max_age(max_age)
        .build()
}

pub fn session_cookie(cfg: &SessionConfig, session_id: Uuid) -> String {
    build_cookie(cfg, session_id.to_string(), Duration::minutes(cfg.ttl_minutes)).to_string()
}

pub fn cleared_session_cookie(cfg: &SessionConfig) -> String {
    build_cookie(cfg, String::new(), Duration::ZERO).to_string()
}

/// Creates a session for `user` and returns the `Set-Cookie` value binding it.
/// Expired sessions are swept first so the table does not grow without bound.
pub async fn bind_session(state: &AppState, user: &User) -> Result<String, AppError> {
    match state.store.purge_expired_sessions().await {
        Ok(0) => {}
        Ok(purged) => debug!(purged, "expired sessions removed"),
        Err(e) => warn!(error = %e, "failed to purge expired sessions"),
    }

    let cfg = &state.config.session;
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(cfg.ttl_minutes);
    let session = state
        .store
        .create_session(user.id, user.role, expires_at)
        .await?;
    debug!(user_id = %user.id, session_id = %session.id, "session bound");
    Ok(session_cookie(cfg, session.id))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = session_id_from_headers(&parts.headers, &state.config.session.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let session = state
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| {
                debug!(%session_id, "unknown or expired session");
                AppError::Unauthorized
            })?;

        Ok(CurrentUser {
            user_id: session.user_id,
            role: session.role,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for DriverUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Driver {
            return Err(AppError::Forbidden(
                "Only drivers can perform this action".into(),
            ));
        }
        Ok(DriverUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RiderUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Rider {
            return Err(AppError::Forbidden(
                "Only riders can perform this action".into(),
            ));
        }
        Ok(RiderUser(user))
    }
}
