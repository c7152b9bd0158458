//! capsync common utilities
//!
//! Shared infrastructure for all capsync crates:
//! - Error types and result aliases
//! - Session clock and timestamp utilities for stream synchronization
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
