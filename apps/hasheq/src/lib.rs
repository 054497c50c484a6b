//! # hasheq application library
//!
//! The pieces of the hasheq binary: configuration, the HTTP API and the
//! CLI. They live in a library so the integration tests can drive the
//! router directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
