// Observability infrastructure using tracing crate
// Human-readable logs by default, JSON for log shippers when running under cron

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize the observability system.
/// `RUST_LOG` overrides the default filter, e.g. `RUST_LOG=certwarden=debug`.
pub fn init(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "certwarden=debug"
    } else {
        "certwarden=info"
    };

    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))?;

    // Logs go to stderr so stdout stays clean for the report
    let registry = tracing_subscriber::registry().with(filter_layer);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}

/// Span covering one dispatcher run
#[inline]
pub fn run_span(run_id: Uuid) -> tracing::Span {
    tracing::info_span!("run", run_id = %run_id)
}
