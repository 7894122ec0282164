//! Tracing initialization.
//!
//! The adapter logs through `tracing`; every command handler carries an
//! instrument span, state corrections log at `info`, failures at `warn`.
//! Filtering follows `RUST_LOG` when set, otherwise the level passed in.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Install a compact global subscriber.
///
/// Idempotent: a second call (common in tests) is a no-op rather than an
/// error.
pub fn init(default_level: &str) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_ansi(false)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .or_else(|e| {
            if e.to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("failed to initialize tracing: {e}"))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        assert!(init("info").is_ok());
        assert!(init("debug").is_ok());
    }
}
