//! Tracing setup for composition roots.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The filter comes from `CONVOY_LOG` (standard `EnvFilter` syntax),
/// defaulting to `info`. Output goes to stderr so it never corrupts a
/// terminal UI on stdout. Calling this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("CONVOY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
