//! capsync Worker
//!
//! Runs a capture session in a child process. The parent talks to it over
//! the child's stdin/stdout using length-prefixed JSON frames (see
//! [`protocol`]); stderr carries the worker's logs.

pub mod client;
pub mod host;
pub mod protocol;
pub mod recorder;

pub use client::{WorkerEvent, WorkerHandle, WorkerLifecycle};
pub use host::run_worker;
pub use protocol::{Message, Verb};
pub use recorder::{WorkerRecorder, WorkerRecorderFactory};
