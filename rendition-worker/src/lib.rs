//! Async front for the reconciliation engine: one serialized queue per
//! (project, asset-class) key.

mod dispatcher;
mod error;

pub use dispatcher::{Dispatcher, DispatcherStatus};
pub use error::WorkerError;

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Same as [`init_tracing`] with one JSON object per line.
pub fn init_json_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
