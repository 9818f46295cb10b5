//! Common test utilities and helpers
//!
//! This module provides shared utilities for the integration tests:
//! - Backend fixtures on a wiremock server
//! - A local Pusher-protocol push server
//! - Custom assertion macros

#![allow(dead_code)]

pub mod assertions;
pub mod backend;
pub mod push_server;

// Re-export commonly used utilities
pub use backend::*;
pub use push_server::*;

use std::time::Duration;

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
