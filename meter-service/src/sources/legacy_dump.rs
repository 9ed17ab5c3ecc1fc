use std::path::PathBuf;

use async_stream::stream;
use serde::Deserialize;
use serde_json::Value;

use super::decode_record;
use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Reads a whole `{"leituras": [...], "ultimaAtualizacao": ...}` data file as
/// written by older server revisions.
pub struct LegacyDumpSource {
    path: PathBuf,
}

#[derive(Deserialize)]
struct Dump {
    #[serde(rename = "leituras", default)]
    readings: Vec<Value>,
}

impl LegacyDumpSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source for LegacyDumpSource {
    async fn stream(&self) -> EnvelopeStream {
        let path = self.path.clone();
        let s = stream! {
            let dump = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<Dump>(&bytes).map_err(|e| {
                    PipelineError::Source(format!("failed to parse {}: {e}", path.display()))
                }),
                Err(e) => Err(PipelineError::Source(format!(
                    "failed to read {}: {e}",
                    path.display()
                ))),
            };
            match dump {
                Ok(dump) => {
                    tracing::info!(records = dump.readings.len(), path = %path.display(), "legacy dump loaded");
                    for (i, value) in dump.readings.into_iter().enumerate() {
                        let position = i + 1;
                        yield decode_record(value, position).map(|reading| Envelope { reading, position });
                    }
                }
                Err(e) => yield Err(e),
            }
        };

        Box::pin(s)
    }
}
