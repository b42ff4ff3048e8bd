//! Shared helpers for the bootdag integration tests: tracing setup, a
//! timeout guard for async assertions, node and config builders, and
//! recording fakes.

pub mod builders;
pub mod plugin;
pub mod recorder;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

pub use recorder::Recorder;

/// Upper bound for any single awaited step in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Engine, queue and scheduler logs only show up for failing tests; filter
/// with `RUST_LOG`, e.g. `RUST_LOG=bootdag::queue=trace`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
///
/// Wrap every wait on the engine with this so a stuck graph shows up as a
/// failure instead of a hung test run.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("step did not complete within {TEST_TIMEOUT:?}"),
    }
}
