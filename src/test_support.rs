//! Shared test-only plumbing: a one-shot `tracing` subscriber so the
//! `debug!`/`trace!` events emitted by the manifest store, registries, and
//! context are visible under `RUST_LOG=trace cargo test -- --nocapture`.

/// Installs a `tracing` subscriber writing to the test harness's captured
/// stdout. Safe to call from multiple tests; only the first call wins.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
