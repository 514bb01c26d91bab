//! Helpers for testing the price cache and the command line tool.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Tests dealing with latency and expiry should run on a paused clock
//!    (`#[tokio::test(start_paused = true)]`). Elapsed times measured with [`timed`] are then
//!    exact, and waiting for an entry to expire does not slow down the test suite.
//!
//!  - When using [`config_file`], make sure that the returned handle is held for as long as the
//!    file is needed. The file is deleted when the handle is dropped.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::time::Instant;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::NamedTempFile;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `pricecache` crates and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("pricecache=trace,pricecache_cli=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Awaits `future` and returns its output along with the time it took.
pub async fn timed<F: Future>(future: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let output = future.await;
    (output, start.elapsed())
}

/// Writes `contents` into a temporary configuration file.
///
/// # Panics
///
/// Panics if the file cannot be created or written.
pub fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
