//! Property-based tests
//!
//! Uses proptest to generate random inputs and verify properties

mod replies_proptest;
mod search_proptest;
