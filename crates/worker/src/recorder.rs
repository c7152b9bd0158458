//! [`Recorder`] backed by a worker process.

use std::path::Path;

use capsync_capture_engine::{
    Recorder, RecorderFactory, RecordingOptions, SessionResult, SessionStatus, StopResult,
};
use capsync_common::config::WorkerConfig;
use capsync_common::error::CapsyncResult;
use capsync_platform_core::{DisplayInfo, WindowInfo};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::WorkerHandle;
use crate::protocol::{StartRecordingRequest, Verb};

/// One recording slot hosted in its own process.
pub struct WorkerRecorder {
    handle: WorkerHandle,
    config: WorkerConfig,
}

impl WorkerRecorder {
    pub async fn spawn(config: &WorkerConfig) -> CapsyncResult<Self> {
        let handle = WorkerHandle::spawn(config).await?;
        Ok(Self::from_handle(handle, config.clone()))
    }

    pub fn from_handle(handle: WorkerHandle, config: WorkerConfig) -> Self {
        Self { handle, config }
    }

    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    async fn call<T: DeserializeOwned>(
        &self,
        verb: Verb,
        data: Value,
        timeout: std::time::Duration,
    ) -> CapsyncResult<T> {
        let value = self.handle.send(verb, data, timeout).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn displays(&self) -> CapsyncResult<Vec<DisplayInfo>> {
        self.call(Verb::GetDisplays, Value::Null, self.config.request_timeout())
            .await
    }

    pub async fn windows(&self) -> CapsyncResult<Vec<WindowInfo>> {
        self.call(Verb::GetWindows, Value::Null, self.config.request_timeout())
            .await
    }

    pub async fn ping(&self) -> CapsyncResult<Value> {
        self.handle
            .send(Verb::Ping, Value::Null, self.config.request_timeout())
            .await
    }
}

#[async_trait::async_trait]
impl Recorder for WorkerRecorder {
    async fn start(
        &mut self,
        output_path: &Path,
        options: RecordingOptions,
    ) -> CapsyncResult<SessionResult> {
        let request = StartRecordingRequest {
            output_path: output_path.to_path_buf(),
            options,
        };
        let data = serde_json::to_value(request)?;
        self.call(Verb::StartRecording, data, self.config.start_timeout())
            .await
    }

    async fn stop(&mut self) -> CapsyncResult<StopResult> {
        self.call(Verb::StopRecording, Value::Null, self.config.stop_timeout())
            .await
    }

    async fn status(&mut self) -> CapsyncResult<SessionStatus> {
        self.call(Verb::GetStatus, Value::Null, self.config.request_timeout())
            .await
    }

    async fn shutdown(&mut self) -> CapsyncResult<()> {
        self.handle.shutdown().await;
        Ok(())
    }

    fn label(&self) -> String {
        format!("worker#{}", self.handle.generation())
    }
}

/// Spawns one worker process per window.
pub struct WorkerRecorderFactory {
    config: WorkerConfig,
}

impl WorkerRecorderFactory {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl RecorderFactory for WorkerRecorderFactory {
    async fn create(&self, window: &WindowInfo) -> CapsyncResult<Box<dyn Recorder>> {
        let recorder = WorkerRecorder::spawn(&self.config).await?;
        tracing::debug!(
            window_id = window.id,
            worker = %recorder.label(),
            "Spawned worker for window"
        );
        Ok(Box::new(recorder))
    }
}
