//! Streamgate - capability-token indirection proxy for extracted media streams
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod extractor;
pub mod hls;
pub mod proxy;
pub mod rewrite;
pub mod server;
pub mod token;
