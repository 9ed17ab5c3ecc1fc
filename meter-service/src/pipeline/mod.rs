//! Batch import of readings: a `Source` feeds envelopes through zero or more
//! `Transform`s into a `Sink`.

use std::{pin::Pin, sync::Arc};

use futures::{Stream, StreamExt};
use meter_core::domain::Reading;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub reading: Reading,
    /// 1-based record number within the source, for error reports.
    pub position: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Envelope, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn stream(&self) -> EnvelopeStream;
}

#[async_trait::async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, input: Envelope) -> Result<Envelope, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn run(&self, input: EnvelopeStream) -> Result<ImportReport, PipelineError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: usize,
}

pub struct Pipeline {
    pub source: Box<dyn Source>,
    pub transforms: Vec<Arc<dyn Transform>>,
    pub sink: Box<dyn Sink>,
}

impl Pipeline {
    pub async fn run(self) -> Result<ImportReport, PipelineError> {
        let mut stream = self.source.stream().await;

        for t in self.transforms {
            stream = Box::pin(stream.then(move |item| {
                let t = t.clone();
                async move {
                    match item {
                        Ok(env) => t.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await
    }
}
