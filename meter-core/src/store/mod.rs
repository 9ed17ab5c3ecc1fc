use std::collections::VecDeque;

use time::OffsetDateTime;

use crate::domain::Reading;

pub mod json_file;
pub mod memory;
pub mod sqlite;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("timestamp out of range: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

/// Result of a successful insert.
#[derive(Debug, Clone)]
pub struct Inserted {
    /// The reading as stored (its `created_at` may have been clamped).
    pub reading: Reading,
    /// Number of readings held after the insert and any eviction.
    pub total: usize,
}

/// Append-only, capacity-bounded sequence of readings ordered by
/// `created_at`.
///
/// Buffered implementations insert into memory before persisting: when
/// `insert` returns an error the reading is still served by `recent` and
/// `window`. `clear` is all-or-nothing.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert(&self, reading: Reading) -> Result<Inserted, StoreError>;

    /// Appends `readings` in order with a single write to the backing store
    /// and returns the number held afterwards. All-or-nothing: on error none
    /// of the batch is visible, so a failed batch can be retried as a whole.
    async fn insert_many(&self, readings: Vec<Reading>) -> Result<usize, StoreError>;

    /// At most `n` readings, newest first.
    async fn recent(&self, n: usize) -> Result<Vec<Reading>, StoreError>;

    /// Readings with `since <= created_at < until`, oldest first.
    async fn window(
        &self,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Short label for health output.
    fn backend(&self) -> &'static str;
}

/// In-memory ring shared by the memory and file stores. Oldest reading at
/// the front.
#[derive(Debug, Clone)]
pub struct ReadingLog {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl ReadingLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Builds a log from already-ordered readings, keeping the newest
    /// `capacity` of them.
    pub fn from_readings(readings: Vec<Reading>, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        for reading in readings {
            log.push(reading);
        }
        log
    }

    /// Appends, clamping `created_at` so the sequence stays non-decreasing,
    /// then evicts from the front down to capacity.
    pub fn push(&mut self, mut reading: Reading) -> &Reading {
        if let Some(last) = self.readings.back() {
            if reading.created_at < last.created_at {
                reading.created_at = last.created_at;
            }
        }
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
        // Non-empty after push_back.
        &self.readings[self.readings.len() - 1]
    }

    pub fn recent(&self, n: usize) -> Vec<Reading> {
        self.readings.iter().rev().take(n).cloned().collect()
    }

    pub fn window(&self, since: OffsetDateTime, until: OffsetDateTime) -> Vec<Reading> {
        let start = self.readings.partition_point(|r| r.created_at < since);
        let end = self.readings.partition_point(|r| r.created_at < until);
        if start >= end {
            return Vec::new();
        }
        self.readings.range(start..end).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use time::{Duration, OffsetDateTime};

    use crate::domain::{Reading, ReadingPayload};

    pub fn reading_at(created_at: OffsetDateTime, demand: Option<f64>) -> Reading {
        let mut payload = ReadingPayload::default();
        payload.device_id = Some("multimedidor_ufrj_001".to_string());
        payload.measurements.active_demand = demand;
        Reading::received(payload, None, created_at)
    }

    /// `n` readings one minute apart, demand equal to the index.
    pub fn series(start: OffsetDateTime, n: usize) -> Vec<Reading> {
        (0..n)
            .map(|i| reading_at(start + Duration::minutes(i as i64), Some(i as f64)))
            .collect()
    }
}
