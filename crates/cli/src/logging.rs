//! Tracing setup for the `promptgate` binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "promptgate=info,promptgate_core=info,promptgate_storage=info,promptgate_sqlite=info,tower_http=warn";

/// Install the global subscriber. Logs go to stderr; `RUST_LOG` wins over
/// the defaults.
pub(crate) fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}
