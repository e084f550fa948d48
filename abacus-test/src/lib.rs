//! Test utilities for the Abacus counter harness and its client.
//!
//! This crate provides utilities to facilitate testing of the load-testing
//! harness and the counter client. See the modules for all available
//! utilities.

pub mod server;
pub mod tracing;
