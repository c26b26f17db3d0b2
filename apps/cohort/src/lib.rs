//! # Cohort Application Library
//!
//! Library surface of the Cohort binary: the HTTP API and the CLI,
//! exposed so integration tests can drive the router, handlers, and
//! request/response types directly. The binary entry point lives in
//! `main.rs` and assembles the same modules.

pub mod api;
pub mod cli;
