//! capsync Capture Engine
//!
//! Runs recording sessions on top of the native capture backend. A session
//! is one native start call (screen, audio and camera together) plus the
//! cursor sampler, all anchored to a single session timestamp.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              MultiWindowRecorder              │
//! │   ┌──────────┐ ┌──────────┐   ┌────────────┐  │
//! │   │ Recorder │ │ Recorder │…  │ global     │  │
//! │   │ window 0 │ │ window 1 │   │ cursor log │  │
//! │   └────┬─────┘ └────┬─────┘   └────────────┘  │
//! └────────┼────────────┼─────────────────────────┘
//!          ▼            ▼
//! ┌───────────────────────────────────────────────┐
//! │  CaptureSession (in-process or in a worker)   │
//! │  native backend ──► screen/audio/camera files │
//! │  CursorSampler  ──► temp_cursor_<ts>.jsonl    │
//! └───────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod geometry;
pub mod multi_window;
pub mod paths;
pub mod recorder;
pub mod session;

pub use backend::{default_backend, BackendPointer, SimulatedBackend};
pub use multi_window::*;
pub use paths::SessionPaths;
pub use recorder::*;
pub use session::*;
