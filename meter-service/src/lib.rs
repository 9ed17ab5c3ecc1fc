pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod state;
pub mod transform;

pub use pipeline::{Envelope, Pipeline};
pub use state::AppState;
