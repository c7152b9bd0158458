//! Worker-side request loop.
//!
//! Hosts exactly one [`CaptureSession`] and answers every request with
//! exactly one response. Session events are relayed as `event` messages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use capsync_capture_engine::{CaptureSession, SessionEvent, SessionState};
use capsync_common::config::AppConfig;
use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_platform_core::NativeBackend;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::protocol::{decode, read_frame, write_message, Message, StartRecordingRequest, Verb};

type SharedWriter<W> = Arc<Mutex<W>>;

struct WorkerState {
    backend: Arc<dyn NativeBackend>,
    session: Mutex<CaptureSession>,
    starts_in_flight: AtomicUsize,
}

/// Marks a `startRecording` as in flight until dropped.
struct StartGuard<'a>(&'a AtomicUsize);

impl<'a> StartGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerState {
    fn new(backend: Arc<dyn NativeBackend>, session: CaptureSession) -> Self {
        Self {
            backend,
            session: Mutex::new(session),
            starts_in_flight: AtomicUsize::new(0),
        }
    }

    async fn handle(&self, verb: Verb, data: Value) -> CapsyncResult<Value> {
        match verb {
            Verb::Ping => Ok(json!({ "pong": true, "pid": std::process::id() })),
            Verb::GetDisplays => Ok(serde_json::to_value(self.backend.displays()?)?),
            Verb::GetWindows => Ok(serde_json::to_value(self.backend.windows()?)?),
            Verb::GetStatus => {
                let session = self.session.lock().await;
                Ok(serde_json::to_value(session.status())?)
            }
            Verb::StartRecording => {
                let request: StartRecordingRequest = serde_json::from_value(data)
                    .map_err(|e| CapsyncError::invalid_argument(format!("startRecording: {e}")))?;
                let _starting = StartGuard::enter(&self.starts_in_flight);
                let mut session = self.session.lock().await;
                let result = session.start(&request.output_path, request.options).await?;
                Ok(serde_json::to_value(result)?)
            }
            Verb::StopRecording => {
                // Counted before the session lock is taken, so a stop racing a
                // start is refused instead of queued behind it.
                if self.starts_in_flight.load(Ordering::SeqCst) > 0 {
                    return Err(CapsyncError::not_recording(SessionState::Starting));
                }
                let mut session = self.session.lock().await;
                let result = session.stop().await?;
                Ok(serde_json::to_value(result)?)
            }
        }
    }
}

fn event_message(event: &SessionEvent) -> CapsyncResult<Message> {
    let mut tagged = serde_json::to_value(event)?;
    let data = tagged
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null);
    Ok(Message::Event {
        event: event.name().to_string(),
        data,
    })
}

async fn send<W>(writer: &SharedWriter<W>, message: &Message)
where
    W: AsyncWrite + Unpin + Send,
{
    let mut w = writer.lock().await;
    if let Err(e) = write_message(&mut *w, message).await {
        tracing::warn!(error = %e, "Failed to write to parent");
    }
}

async fn relay_events<W>(
    mut events: broadcast::Receiver<SessionEvent>,
    writer: SharedWriter<W>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event) => match event_message(&event) {
                Ok(message) => send(&writer, &message).await,
                Err(e) => tracing::warn!(error = %e, event = event.name(), "Could not encode event"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event relay lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Serve requests until the parent closes the channel.
///
/// An active recording is stopped before returning.
pub async fn run_worker<R, W>(
    mut reader: R,
    writer: W,
    backend: Arc<dyn NativeBackend>,
    config: &AppConfig,
) -> CapsyncResult<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session = CaptureSession::new(backend.clone(), config.cursor.clone());
    let events = session.subscribe();
    let state = Arc::new(WorkerState::new(backend, session));
    let writer: SharedWriter<W> = Arc::new(Mutex::new(writer));
    let cancel = CancellationToken::new();

    let relay = tokio::spawn(relay_events(events, writer.clone(), cancel.clone()));

    tracing::info!(pid = std::process::id(), backend = state.backend.name(), "Worker ready");
    send(&writer, &Message::Ready).await;

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Parent channel failed");
                break;
            }
        };

        let (id, verb, data) = match decode(&frame) {
            Ok(Message::Request { id, verb, data }) => (id, verb, data),
            Ok(other) => {
                tracing::warn!(?other, "Ignoring non-request message");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed message");
                continue;
            }
        };

        tracing::debug!(id, %verb, "Handling request");
        let state = state.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            let outcome = state.handle(verb, data).await.map_err(|e| {
                tracing::warn!(id, %verb, error = %e, "Request failed");
                e.to_string()
            });
            let response = Message::Response {
                id: Some(id),
                verb,
                outcome,
            };
            send(&writer, &response).await;
        });
    }

    tracing::info!("Parent closed the channel, shutting down");
    {
        let mut session = state.session.lock().await;
        if session.state() == SessionState::Active {
            match session.stop().await {
                Ok(result) => tracing::info!(success = result.success, "Stopped orphaned recording"),
                Err(e) => tracing::error!(error = %e, "Failed to stop orphaned recording"),
            }
        }
    }

    cancel.cancel();
    if let Err(e) = relay.await {
        tracing::debug!(error = %e, "Event relay ended abnormally");
    }
    Ok(())
}
