//! The seam between session sequencing and where a session actually runs.
//!
//! A [`Recorder`] is one logical recording slot. It can be a session in
//! this process ([`LocalRecorder`]) or a session hosted by a worker
//! process.

use std::path::Path;
use std::sync::Arc;

use capsync_common::config::CursorConfig;
use capsync_common::error::CapsyncResult;
use capsync_platform_core::{NativeBackend, WindowInfo};

use crate::session::{CaptureSession, RecordingOptions, SessionResult, SessionStatus, StopResult};

/// One recording slot.
#[async_trait::async_trait]
pub trait Recorder: Send {
    async fn start(
        &mut self,
        output_path: &Path,
        options: RecordingOptions,
    ) -> CapsyncResult<SessionResult>;

    async fn stop(&mut self) -> CapsyncResult<StopResult>;

    async fn status(&mut self) -> CapsyncResult<SessionStatus>;

    /// Release the slot. A recorder is unusable afterwards.
    async fn shutdown(&mut self) -> CapsyncResult<()>;

    /// Short label for logging.
    fn label(&self) -> String;
}

/// Creates one recorder per window.
#[async_trait::async_trait]
pub trait RecorderFactory: Send + Sync {
    async fn create(&self, window: &WindowInfo) -> CapsyncResult<Box<dyn Recorder>>;
}

/// A session running in this process.
pub struct LocalRecorder {
    session: CaptureSession,
    label: String,
}

impl LocalRecorder {
    pub fn new(backend: Arc<dyn NativeBackend>, cursor_config: CursorConfig) -> Self {
        let label = format!("local:{}", backend.name());
        Self {
            session: CaptureSession::new(backend, cursor_config),
            label,
        }
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }
}

#[async_trait::async_trait]
impl Recorder for LocalRecorder {
    async fn start(
        &mut self,
        output_path: &Path,
        options: RecordingOptions,
    ) -> CapsyncResult<SessionResult> {
        self.session.start(output_path, options).await
    }

    async fn stop(&mut self) -> CapsyncResult<StopResult> {
        self.session.stop().await
    }

    async fn status(&mut self) -> CapsyncResult<SessionStatus> {
        Ok(self.session.status())
    }

    async fn shutdown(&mut self) -> CapsyncResult<()> {
        if self.session.state() == crate::session::SessionState::Active {
            self.session.stop().await?;
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

type BackendMaker = dyn Fn() -> Arc<dyn NativeBackend> + Send + Sync;

/// Builds [`LocalRecorder`]s.
pub struct LocalRecorderFactory {
    make_backend: Box<BackendMaker>,
    cursor_config: CursorConfig,
}

impl LocalRecorderFactory {
    /// Every recorder shares one backend (and therefore one recording slot).
    pub fn shared(backend: Arc<dyn NativeBackend>, cursor_config: CursorConfig) -> Self {
        Self {
            make_backend: Box::new(move || backend.clone()),
            cursor_config,
        }
    }

    /// Every recorder gets a backend of its own.
    pub fn per_recorder<F>(make_backend: F, cursor_config: CursorConfig) -> Self
    where
        F: Fn() -> Arc<dyn NativeBackend> + Send + Sync + 'static,
    {
        Self {
            make_backend: Box::new(make_backend),
            cursor_config,
        }
    }
}

#[async_trait::async_trait]
impl RecorderFactory for LocalRecorderFactory {
    async fn create(&self, window: &WindowInfo) -> CapsyncResult<Box<dyn Recorder>> {
        tracing::debug!(window_id = window.id, app = %window.app_name, "Creating local recorder");
        Ok(Box::new(LocalRecorder::new(
            (self.make_backend)(),
            self.cursor_config.clone(),
        )))
    }
}
