//! Native backend selection.

pub mod simulated;

pub use simulated::{SimulatedBackend, StartFailure};

use std::sync::Arc;

use capsync_common::error::CapsyncResult;
use capsync_platform_core::{NativeBackend, PointerSample, PointerSource};

/// Exposes a shared native backend as a plain pointer source for the
/// cursor sampler.
#[derive(Clone)]
pub struct BackendPointer(pub Arc<dyn NativeBackend>);

impl PointerSource for BackendPointer {
    fn cursor_position(&self) -> CapsyncResult<PointerSample> {
        self.0.cursor_position()
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}

/// Get the backend for this process.
///
/// No native backend is linked into this build, so the process-wide
/// simulated backend is returned.
pub fn default_backend() -> Arc<dyn NativeBackend> {
    tracing::warn!("No native capture backend linked, using simulated backend");
    Arc::new(SimulatedBackend::process_shared())
}
