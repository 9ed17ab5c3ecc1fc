use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::{io::AsyncWriteExt, sync::Mutex};

use super::{Inserted, ReadingLog, ReadingStore, StoreError};
use crate::domain::Reading;

/// On-disk document as read. Records stay raw JSON so one malformed entry
/// written by an older revision only costs that entry.
#[derive(Debug, Default, Deserialize)]
struct DataFile {
    #[serde(rename = "leituras", default)]
    readings: Vec<Value>,
}

/// On-disk document as written, compatible with the data files of the
/// older Node revisions of the service.
#[derive(Serialize)]
struct DataFileRef<'a> {
    #[serde(rename = "leituras")]
    readings: Vec<&'a Reading>,
    #[serde(rename = "ultimaAtualizacao", with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

/// Memory-first store that rewrites a JSON document after every mutation.
///
/// The whole log is serialized on each insert, so this backend is meant for
/// the small capacities a single meter produces (a few thousand readings).
/// Bulk loads should go through `insert_many`, which writes once per batch.
pub struct JsonFileStore {
    path: PathBuf,
    log: Mutex<ReadingLog>,
}

impl JsonFileStore {
    /// Opens `path`, loading any readings already there. A missing file is
    /// an empty store. A document that is not valid JSON is moved aside to
    /// `<path>.corrupt` and the store starts empty; individual records
    /// without a usable `created_at` are skipped.
    pub async fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<DataFile>(&bytes) {
                Ok(doc) => doc.readings,
                Err(e) => {
                    let aside = sibling(&path, ".corrupt");
                    tracing::warn!(
                        error = %e,
                        path = %path.display(),
                        moved_to = %aside.display(),
                        "data file unreadable, starting empty"
                    );
                    tokio::fs::rename(&path, &aside).await?;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut readings = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for (i, record) in records.into_iter().enumerate() {
            match Reading::from_stored(record) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(error = %e, record = i + 1, path = %path.display(), "skipping stored record");
                }
            }
        }

        let log = ReadingLog::from_readings(readings, capacity);
        tracing::info!(path = %path.display(), readings = log.len(), skipped, "json data file loaded");

        Ok(Self {
            path,
            log: Mutex::new(log),
        })
    }

    /// Writes the document to `<path>.tmp`, syncs it and renames it over
    /// `path`.
    async fn persist<'a>(
        &self,
        readings: impl Iterator<Item = &'a Reading>,
    ) -> Result<(), StoreError> {
        let doc = DataFileRef {
            readings: readings.collect(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let bytes = serde_json::to_vec(&doc)?;

        let tmp = sibling(&self.path, ".tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait::async_trait]
impl ReadingStore for JsonFileStore {
    async fn insert(&self, reading: Reading) -> Result<Inserted, StoreError> {
        let mut log = self.log.lock().await;
        let reading = log.push(reading).clone();
        let total = log.len();

        if let Err(e) = self.persist(log.iter()).await {
            tracing::error!(error = %e, path = %self.path.display(), "failed to write data file");
            return Err(e);
        }

        Ok(Inserted { reading, total })
    }

    async fn insert_many(&self, readings: Vec<Reading>) -> Result<usize, StoreError> {
        let mut log = self.log.lock().await;
        let mut next = log.clone();
        for reading in readings {
            next.push(reading);
        }

        if let Err(e) = self.persist(next.iter()).await {
            tracing::error!(error = %e, path = %self.path.display(), "failed to write data file");
            return Err(e);
        }

        *log = next;
        Ok(log.len())
    }

    async fn recent(&self, n: usize) -> Result<Vec<Reading>, StoreError> {
        Ok(self.log.lock().await.recent(n))
    }

    async fn window(
        &self,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        Ok(self.log.lock().await.window(since, until))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.log.lock().await.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut log = self.log.lock().await;
        // Disk first: if the write fails nothing has changed.
        self.persist(std::iter::empty()).await?;
        log.clear();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "json_file"
    }
}
