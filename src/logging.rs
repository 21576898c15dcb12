// Logging setup shared by both front-ends
use tracing_subscriber::EnvFilter;

/// Install the global subscriber (set RUST_LOG=debug to see every frame).
///
/// Logs go to stderr; stdout carries only command replies such as the battery voltage.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}
