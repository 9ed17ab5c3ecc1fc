use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{Inserted, ReadingStore, StoreError};
use crate::domain::Reading;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS readings (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at_ms INTEGER NOT NULL,
        device_id     TEXT,
        client_ip     TEXT,
        demand_w      REAL,
        body          TEXT NOT NULL
    )
"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_readings_created_at ON readings (created_at_ms)";

/// SQLite-backed store. Each reading is kept as a JSON body plus a few
/// indexed columns; `created_at` is truncated to millisecond precision.
///
/// Writers are serialized in-process by `write_lock`. SQLite transactions
/// start deferred, and two of them upgrading to a write lock at once fail
/// with `SQLITE_BUSY` instead of waiting on the busy timeout.
pub struct SqliteStore {
    pool: SqlitePool,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    pub async fn open(url: &str, max_connections: u32, capacity: usize) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::with_pool(pool, capacity).await
    }

    /// Private in-memory database, mostly for tests. A single connection is
    /// pinned open since each SQLite memory connection is its own database.
    pub async fn in_memory(capacity: usize) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, capacity).await
    }

    async fn with_pool(pool: SqlitePool, capacity: usize) -> Result<Self, StoreError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        Ok(Self {
            pool,
            capacity: capacity.max(1),
            write_lock: Mutex::new(()),
        })
    }
}

fn unix_ms_floor(ts: OffsetDateTime) -> i64 {
    ts.unix_timestamp_nanos().div_euclid(1_000_000) as i64
}

fn unix_ms_ceil(ts: OffsetDateTime) -> i64 {
    let nanos = ts.unix_timestamp_nanos();
    let ms = nanos.div_euclid(1_000_000);
    (if nanos.rem_euclid(1_000_000) > 0 { ms + 1 } else { ms }) as i64
}

fn from_unix_ms(ms: i64) -> Result<OffsetDateTime, StoreError> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(
        i128::from(ms) * 1_000_000,
    )?)
}

fn decode_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Reading>, StoreError> {
    rows.into_iter()
        .map(|row| {
            let body: String = row.try_get("body")?;
            Ok(serde_json::from_str(&body)?)
        })
        .collect()
}

impl SqliteStore {
    /// Inserts `readings` in one transaction, clamping each `created_at` to
    /// the newest stored instant, then evicts down to capacity. Returns the
    /// rows as stored and the count afterwards.
    async fn write_batch(&self, readings: Vec<Reading>) -> Result<(Vec<Reading>, usize), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut last: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at_ms) FROM readings")
            .fetch_one(&mut *tx)
            .await?;
        let mut stored = Vec::with_capacity(readings.len());

        for mut reading in readings {
            let ms = match last {
                Some(last) => unix_ms_floor(reading.created_at).max(last),
                None => unix_ms_floor(reading.created_at),
            };
            reading.created_at = from_unix_ms(ms)?;
            last = Some(ms);

            let body = serde_json::to_string(&reading)?;
            sqlx::query(
                "INSERT INTO readings (created_at_ms, device_id, client_ip, demand_w, body) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(ms)
            .bind(&reading.device_id)
            .bind(&reading.client_ip)
            .bind(reading.demand())
            .bind(&body)
            .execute(&mut *tx)
            .await?;
            stored.push(reading);
        }

        sqlx::query(
            "DELETE FROM readings WHERE id NOT IN \
             (SELECT id FROM readings ORDER BY id DESC LIMIT ?)",
        )
        .bind(self.capacity as i64)
        .execute(&mut *tx)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((stored, total as usize))
    }
}

#[async_trait::async_trait]
impl ReadingStore for SqliteStore {
    async fn insert(&self, reading: Reading) -> Result<Inserted, StoreError> {
        let (mut stored, total) = self.write_batch(vec![reading]).await?;
        let reading = stored.pop().ok_or(sqlx::Error::RowNotFound)?;
        Ok(Inserted { reading, total })
    }

    async fn insert_many(&self, readings: Vec<Reading>) -> Result<usize, StoreError> {
        let (_, total) = self.write_batch(readings).await?;
        Ok(total)
    }

    async fn recent(&self, n: usize) -> Result<Vec<Reading>, StoreError> {
        let rows = sqlx::query("SELECT body FROM readings ORDER BY id DESC LIMIT ?")
            .bind(n.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await?;
        decode_rows(rows)
    }

    async fn window(
        &self,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        // Stored instants are whole milliseconds, so rounding both bounds up
        // keeps the comparison exact.
        let rows = sqlx::query(
            "SELECT body FROM readings \
             WHERE created_at_ms >= ? AND created_at_ms < ? \
             ORDER BY id",
        )
        .bind(unix_ms_ceil(since))
        .bind(unix_ms_ceil(until))
        .fetch_all(&self.pool)
        .await?;
        decode_rows(rows)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(total as usize)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM readings").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
