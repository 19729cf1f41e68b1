//! Observability: tracing setup and Prometheus metrics.

pub mod metrics;

pub use self::metrics::{MetricsError, init_metrics};

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "oi_monitor=info";

/// Initialize the tracing subscriber with an environment filter.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` applies. Calling
/// this twice is harmless (the second call is ignored).
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
