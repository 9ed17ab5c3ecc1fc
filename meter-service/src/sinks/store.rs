use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use meter_core::{domain::Reading, store::ReadingStore};

use crate::pipeline::{Envelope, EnvelopeStream, ImportReport, PipelineError, Sink};

/// Writes envelopes into a `ReadingStore` in source order, `batch_size` at
/// a time through `insert_many`, so a file-backed store rewrites its
/// document once per batch instead of once per reading.
pub struct StoreSink {
    store: Arc<dyn ReadingStore>,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl StoreSink {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            let readings: Vec<Reading> = batch.iter().map(|env| env.reading.clone()).collect();
            match self.store.insert_many(readings).await {
                Ok(total) => {
                    metrics::counter!("import_imported_total").increment(batch.len() as u64);
                    tracing::debug!(rows = batch.len(), total, "import batch written");
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        first_position = batch[0].position,
                        "store batch write failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, first_position = batch[0].position, "store batch write failed, giving up");
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink for StoreSink {
    async fn run(&self, mut input: EnvelopeStream) -> Result<ImportReport, PipelineError> {
        let mut report = ImportReport::default();
        let mut buffer: Vec<Envelope> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!(error = %e, "record rejected");
                    metrics::counter!("import_rejected_total").increment(1);
                    report.rejected += 1;
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await?;
                report.imported += buffer.len();
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&buffer).await?;
            report.imported += buffer.len();
        }

        Ok(report)
    }
}
