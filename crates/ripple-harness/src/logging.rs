#![forbid(unsafe_code)]

//! Test logging setup.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test writer, filtered by `RUST_LOG`
/// (default: debug for the ripple crates). Safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ripple_core=debug,ripple_harness=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
