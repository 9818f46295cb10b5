//! Integration tests
//!
//! The client against a wiremock backend and a local push server.

#[path = "../common/mod.rs"]
mod common;

mod realtime_test;
mod sync_test;
