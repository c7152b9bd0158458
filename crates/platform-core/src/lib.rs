//! capsync platform core contracts.
//!
//! This crate contains the display/window data structures and the narrow
//! interface to the native capture backend. Capture, cursor and worker
//! crates depend on these contracts without coupling to a concrete
//! OS backend.

pub mod backend;
pub mod geometry;

pub use backend::*;
pub use geometry::*;
