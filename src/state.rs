use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{AppConfig, StoreBackend};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let db = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("postgres store ready");
                Arc::new(PgStore::new(db)) as Arc<dyn Store>
            }
            StoreBackend::Memory => {
                info!("in-memory store ready; data is lost on exit");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        Ok(Self { store, config })
    }

    /// In-memory state with default settings.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    #[cfg(test)]
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        use crate::config::SessionConfig;

        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            session: SessionConfig::default(),
            static_dir: None,
            cors_origins: Vec::new(),
        });
        Self { store, config }
    }
}
