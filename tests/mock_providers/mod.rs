//! Mock upstream servers for integration tests
//!
//! - `realtime_mock`: scripted OpenAI Realtime WebSocket server

// Not every test uses every helper.
#![allow(dead_code)]

pub mod realtime_mock;

use std::time::Duration;

/// Route engine logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("realtime_instructor=debug")
        .try_init();
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
