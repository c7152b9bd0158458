//! capsync project model
//!
//! Defines the data contracts shared by recorders and downstream tools:
//! - **Events:** cursor samples and the cursor log formats
//! - **Metadata:** the multi-window session document
//!
//! Cursor positions are in pixels; the `coordinateSystem` tag on each
//! event says which frame they are relative to.

pub mod event;
pub mod metadata;

pub use event::*;
pub use metadata::*;
