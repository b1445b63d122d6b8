//! Shared test tooling: tracing setup, a bounded-time future runner, and a
//! small set of deterministic byte generators used across the workspace's
//! test suites.
//!
//! Mirrors the teacher's `zebra-test`: a dependency of every other crate's
//! `[dev-dependencies]`, never depended upon by non-test code, and never
//! depending back on the data-model crates it helps test.

use std::time::Duration;

use tracing_subscriber::prelude::*;

/// Initializes a pretty, env-filtered tracing subscriber for test output.
///
/// Safe to call more than once per process (later calls are no-ops) since
/// `tracing` rejects a second global subscriber silently via `try_init`.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(tracing_error::ErrorLayer::default())
        .with(
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_filter(tracing_subscriber::EnvFilter::from_default_env()),
        )
        .try_init();
}

/// The default timeout applied to [`with_timeout`] when a test doesn't
/// specify one; generous enough for owner-task round trips over a local
/// channel, tight enough to fail fast on a real deadlock.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `future` to completion, panicking with a clear message if it
/// doesn't resolve within `timeout`.
pub async fn with_timeout<F: std::future::Future>(timeout: Duration, future: F) -> F::Output {
    tokio::time::timeout(timeout, future)
        .await
        .expect("test future did not complete before the timeout")
}

/// Builds a 32-byte hash-shaped array from a single repeated byte; handy for
/// constructing deterministic, visually distinct test hashes.
pub fn repeated_byte_array(byte: u8) -> [u8; 32] {
    [byte; 32]
}

/// A monotonically increasing byte sequence, useful for generating a batch
/// of distinct-but-deterministic 32-byte arrays in tests.
pub fn sequential_byte_array(seed: u64) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[24..32].copy_from_slice(&seed.to_be_bytes());
    bytes
}
