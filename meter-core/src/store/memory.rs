use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{Inserted, ReadingLog, ReadingStore, StoreError};
use crate::domain::Reading;

/// Volatile store; contents are lost on restart.
pub struct MemoryStore {
    log: RwLock<ReadingLog>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: RwLock::new(ReadingLog::new(capacity)),
        }
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryStore {
    async fn insert(&self, reading: Reading) -> Result<Inserted, StoreError> {
        let mut log = self.log.write().await;
        let reading = log.push(reading).clone();
        Ok(Inserted {
            reading,
            total: log.len(),
        })
    }

    async fn insert_many(&self, readings: Vec<Reading>) -> Result<usize, StoreError> {
        let mut log = self.log.write().await;
        for reading in readings {
            log.push(reading);
        }
        Ok(log.len())
    }

    async fn recent(&self, n: usize) -> Result<Vec<Reading>, StoreError> {
        Ok(self.log.read().await.recent(n))
    }

    async fn window(
        &self,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        Ok(self.log.read().await.window(since, until))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.log.read().await.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.log.write().await.clear();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
