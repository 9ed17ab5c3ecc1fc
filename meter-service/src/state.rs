use std::sync::Arc;

use meter_core::store::{JsonFileStore, MemoryStore, ReadingStore, SqliteStore};
use time::UtcOffset;

use crate::config::{AppConfig, StoreConfig, StoreKind};

/// Request-independent settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub offset: UtcOffset,
    pub latest_limit: usize,
    pub history_default_limit: usize,
    pub full_export_limit: usize,
    pub summary_export_limit: usize,
    pub max_body_bytes: usize,
}

impl Settings {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            offset: cfg.dashboard.offset()?,
            latest_limit: cfg.dashboard.latest_limit,
            history_default_limit: cfg.dashboard.history_default_limit.max(1),
            full_export_limit: cfg.export.full_limit,
            summary_export_limit: cfg.export.summary_limit,
            max_body_bytes: cfg.server.max_body_bytes,
        })
    }
}

/// Shared handle passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReadingStore>, settings: Settings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }
}

pub async fn open_store(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn ReadingStore>> {
    let store: Arc<dyn ReadingStore> = match cfg.kind {
        StoreKind::Memory => Arc::new(MemoryStore::new(cfg.capacity)),
        StoreKind::JsonFile => Arc::new(JsonFileStore::open(&cfg.path, cfg.capacity).await?),
        StoreKind::Sqlite => Arc::new(
            SqliteStore::open(&cfg.sqlite_url, cfg.max_connections, cfg.capacity).await?,
        ),
    };

    tracing::info!(
        backend = store.backend(),
        capacity = cfg.capacity,
        readings = store.count().await?,
        "reading store ready"
    );
    Ok(store)
}
