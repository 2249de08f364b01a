use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, appending to `log_path`.
///
/// The terminal belongs to the UI, so logs never go to stdout. `RUST_LOG`
/// takes precedence over `default_filter`.
pub fn init_tracing(log_path: &Path, default_filter: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
}
