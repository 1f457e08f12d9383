//! Tracing subscriber setup for games and demos.

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` when
/// `debug` is true. Returns `false` if a global subscriber was already
/// installed, which happens when tests call this more than once.
pub fn init(debug: bool) -> bool {
    let fallback = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(false)
        .try_init()
        .is_ok()
}
