//! Test-scoped tracing output.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global subscriber writing through the test harness's captured
/// output, filtered by `RUST_LOG` (default `ridgedb_core=debug`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ridgedb_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
