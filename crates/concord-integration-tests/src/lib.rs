//! Integration test crate for the Concord session layer.
//!
//! This crate has no library code; it only contains integration tests
//! that drive whole rooms through the in-memory relay of `concord-sim`.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p concord-integration-tests
//! ```
