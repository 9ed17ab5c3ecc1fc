use std::path::PathBuf;

use async_stream::stream;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use super::decode_record;
use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// One stored reading per line. Blank lines are skipped; a line that fails
/// to parse is reported and the rest of the file still flows.
pub struct NdjsonFileSource {
    path: PathBuf,
}

impl NdjsonFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source for NdjsonFileSource {
    async fn stream(&self) -> EnvelopeStream {
        let path = self.path.clone();
        let s = stream! {
            match File::open(&path).await {
                Ok(file) => {
                    let mut lines = BufReader::new(file).lines();
                    let mut position = 0usize;

                    loop {
                        let line = match lines.next_line().await {
                            Ok(Some(line)) => line,
                            Ok(None) => break,
                            Err(e) => {
                                yield Err(PipelineError::Source(format!("failed to read line: {e}")));
                                break;
                            }
                        };
                        if line.trim().is_empty() {
                            continue;
                        }
                        position += 1;

                        match serde_json::from_str(&line) {
                            Ok(value) => {
                                yield decode_record(value, position)
                                    .map(|reading| Envelope { reading, position });
                            }
                            Err(e) => {
                                yield Err(PipelineError::Source(format!("record {position}: {e}")));
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open {}: {e}",
                        path.display()
                    )));
                }
            }
        };

        Box::pin(s)
    }
}
