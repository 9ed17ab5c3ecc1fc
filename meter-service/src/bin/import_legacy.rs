use anyhow::{bail, Result};
use meter_service::{
    config::AppConfig,
    observability,
    pipeline::{Pipeline, Source},
    sinks::StoreSink,
    sources::{LegacyDumpSource, NdjsonFileSource},
    state::open_store,
    transform,
};
use std::{env, path::Path, sync::Arc, time::Duration};

const BATCH_SIZE: usize = 500;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: import_legacy <dados.json | readings.ndjson>");
    }
    let path = Path::new(&args[1]);

    // METER_CONFIG selects the target store, as for the server.
    let cfg = AppConfig::load()?;
    let store = open_store(&cfg.store).await?;

    let existing = store.count().await?;
    if existing > 0 {
        bail!(
            "target store ({}) already holds {existing} readings; clear it before importing",
            store.backend()
        );
    }

    let source: Box<dyn Source> = match path.extension().and_then(|e| e.to_str()) {
        Some("ndjson") | Some("jsonl") => Box::new(NdjsonFileSource::new(path)),
        _ => Box::new(LegacyDumpSource::new(path)),
    };

    let pipeline = Pipeline {
        source,
        transforms: vec![Arc::new(transform::ReadingValidation)],
        sink: Box::new(StoreSink::new(store.clone(), BATCH_SIZE, MAX_RETRIES, RETRY_BACKOFF)),
    };

    let report = pipeline.run().await?;
    tracing::info!(
        imported = report.imported,
        rejected = report.rejected,
        total = store.count().await?,
        "legacy import finished"
    );

    Ok(())
}
