use std::path::PathBuf;

use anyhow::{bail, Context};
use axum::http::HeaderValue;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_minutes: i64,
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "rideshare_session".into(),
            ttl_minutes: 60 * 24 * 7,
            secure: false,
        }
    }
}

/// One year.
const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 365;

impl SessionConfig {
    /// Rejects settings that would produce unusable or malformed cookies.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&self.ttl_minutes) {
            bail!(
                "SESSION_TTL_MINUTES must be between 1 and {MAX_SESSION_TTL_MINUTES}, got {}",
                self.ttl_minutes
            );
        }
        if !is_cookie_token(&self.cookie_name) {
            bail!("SESSION_COOKIE_NAME {:?} is not a valid cookie name", self.cookie_name);
        }
        Ok(())
    }
}

/// RFC 6265 cookie-name token.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
    pub static_dir: Option<PathBuf>,
    /// Origins allowed to make credentialed cross-origin calls. Empty means
    /// any origin, without credentials.
    pub cors_origins: Vec<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match std::env::var("STORE_BACKEND").as_deref() {
            Err(_) | Ok("postgres") => StoreBackend::Postgres,
            Ok("memory") => StoreBackend::Memory,
            Ok(other) => bail!("unknown STORE_BACKEND {other:?}, expected postgres or memory"),
        };

        let database_url = std::env::var("DATABASE_URL").ok();
        if store == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND is postgres");
        }

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            cookie_name: std::env::var("SESSION_COOKIE_NAME").unwrap_or(defaults.cookie_name),
            ttl_minutes: match std::env::var("SESSION_TTL_MINUTES") {
                Ok(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("SESSION_TTL_MINUTES is not a number: {v:?}"))?,
                Err(_) => defaults.ttl_minutes,
            },
            secure: env_parse("SESSION_COOKIE_SECURE").unwrap_or(defaults.secure),
        };
        session.validate()?;

        let cors_origins = parse_origins(&std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default())?;

        Ok(Self {
            store,
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT").unwrap_or(8080),
            session,
            static_dir: std::env::var_os("STATIC_DIR").map(PathBuf::from),
            cors_origins,
        })
    }
}

/// Comma-separated origins such as `https://app.example.com`.
fn parse_origins(raw: &str) -> anyhow::Result<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| {
            if o == "*" || o.parse::<HeaderValue>().is_err() {
                bail!("invalid origin in CORS_ALLOWED_ORIGINS: {o:?}");
            }
            Ok(o.trim_end_matches('/').to_string())
        })
        .collect()
}
