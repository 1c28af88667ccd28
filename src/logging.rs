//! Structured logging setup.
//!
//! Environment-aware tracing subscriber: `RUST_LOG` wins when set, otherwise
//! the default level follows `STRATACACHE_ENV` (debug everywhere except
//! production). `init` tolerates an already-installed subscriber so tests
//! and embedding callers can set up their own.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable naming the runtime environment.
pub const ENV_VAR: &str = "STRATACACHE_ENV";

/// Install the global tracing subscriber.
pub fn init() {
    let environment =
        std::env::var(ENV_VAR).unwrap_or_else(|_| "development".to_string());
    let default_level = match environment.as_str() {
        "production" => "info",
        _ => "debug",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
