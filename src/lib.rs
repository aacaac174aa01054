//! ANGLER: unattended fishing-session automation
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod api;
pub mod session;
pub mod engine;
