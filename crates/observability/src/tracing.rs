//! JSON logging with `RUST_LOG` filtering.

use tracing_subscriber::EnvFilter;

/// Install the global JSON subscriber.
///
/// `default_directive` applies when `RUST_LOG` is unset or unparsable. Sync
/// outcomes are emitted under the `claimsync::outcome` target, so
/// `RUST_LOG=info,claimsync::outcome=debug` also shows stale rejections.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .try_init();
}
