use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Installs the process-wide tracing subscriber. Later calls do nothing.
///
/// `RUST_LOG` overrides the default `hostbridge=info` filter.
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("hostbridge=info"));

        // Another subscriber may already be installed by the embedding process.
        let _ = fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init();
    });
}
