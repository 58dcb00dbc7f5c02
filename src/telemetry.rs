//! Tracing setup for the stream server.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Install a console subscriber logging at `default_level`.
///
/// `RUST_LOG` takes precedence over `default_level` when set.
///
/// # Errors
/// - `TryInitError` - a global subscriber was already installed
pub fn init_tracing(default_level: Level) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
}
