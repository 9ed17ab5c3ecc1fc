use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over the
/// built-in `info` default for both crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("meter_service=info,meter_core=info,tower_http=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
