//! Integration test crate for the Bazaar marketplace.
//!
//! This crate exists solely to run tests that span several Bazaar crates.
//! It has no public API - all functionality is in the test modules.

#![forbid(unsafe_code)]
