//! Parent-side handle to a worker process.
//!
//! Requests are correlated to responses through a pending table keyed by
//! request id. A request that outlives its timeout is evicted from the
//! table; if its response turns up later it is discarded, and a late
//! successful `startRecording` is answered with a `stopRecording` so the
//! worker is not left recording with no owner.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capsync_capture_engine::SessionEvent;
use capsync_common::config::WorkerConfig;
use capsync_common::error::{CapsyncError, CapsyncResult};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::protocol::{decode, read_frame, write_message, Message, Verb};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of a worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLifecycle {
    Starting,
    Ready,
    Closed,
}

/// Something the worker reported outside of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Ready,
    /// A session event relayed from the worker's orchestrator.
    Session(SessionEvent),
    /// An event this side does not know how to type.
    Other { event: String, data: Value },
    /// A response arrived for a request that had already timed out.
    LateResponse { id: Option<u64>, verb: Verb },
    Exited,
}

impl WorkerEvent {
    fn from_wire(event: String, data: Value) -> Self {
        let tagged = serde_json::json!({ "event": event, "data": data });
        match serde_json::from_value::<SessionEvent>(tagged) {
            Ok(session_event) => Self::Session(session_event),
            Err(_) => Self::Other { event, data },
        }
    }
}

type Reply = Result<Value, CapsyncError>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Timed-out request ids remembered for late-response handling. The oldest
/// are forgotten first once this many are outstanding.
const MAX_ABANDONED: usize = 256;

struct Pending {
    expected: Verb,
    reply: oneshot::Sender<Reply>,
}

/// Request bookkeeping. An id lives in exactly one of the two tables, and
/// it moves between them under a single lock.
#[derive(Default)]
struct Requests {
    pending: HashMap<u64, Pending>,
    abandoned: BTreeMap<u64, Verb>,
}

impl Requests {
    fn abandon(&mut self, id: u64, verb: Verb) {
        self.abandoned.insert(id, verb);
        while self.abandoned.len() > MAX_ABANDONED {
            if let Some((old, verb)) = self.abandoned.pop_first() {
                tracing::debug!(id = old, %verb, "Forgetting timed-out request");
            }
        }
    }
}

/// What became of a response.
enum Routed {
    Delivered,
    Late,
    Unmatched,
}

struct Shared {
    generation: u64,
    next_id: AtomicU64,
    requests: Mutex<Requests>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    lifecycle: watch::Sender<WorkerLifecycle>,
    events: broadcast::Sender<WorkerEvent>,
    reclaim_timeout: Duration,
}

impl Shared {
    fn lifecycle(&self) -> WorkerLifecycle {
        *self.lifecycle.borrow()
    }

    fn requests(&self) -> std::sync::MutexGuard<'_, Requests> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn request(self: &Arc<Self>, verb: Verb, data: Value, timeout: Duration) -> Reply {
        match self.lifecycle() {
            WorkerLifecycle::Closed => return Err(CapsyncError::WorkerExited),
            WorkerLifecycle::Starting => return Err(CapsyncError::WorkerNotReady),
            WorkerLifecycle::Ready => {}
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = oneshot::channel();
        self.requests().pending.insert(
            id,
            Pending {
                expected: verb,
                reply: tx,
            },
        );

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.as_mut() {
                Some(w) => write_message(w, &Message::Request { id, verb, data }).await,
                None => Err(CapsyncError::WorkerExited),
            }
        };
        if let Err(e) = written {
            self.requests().pending.remove(&id);
            tracing::warn!(generation = self.generation, id, %verb, error = %e, "Failed to send worker request");
            return Err(match e {
                CapsyncError::Io(_) => CapsyncError::WorkerExited,
                other => other,
            });
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(CapsyncError::WorkerExited),
            Err(_) => {
                let abandoned = {
                    let mut requests = self.requests();
                    let found = requests.pending.remove(&id).is_some();
                    if found {
                        requests.abandon(id, verb);
                    }
                    found
                };
                if !abandoned {
                    // Replies are sent under the lock, so a missing entry
                    // means the reply is already in the channel.
                    return match rx.try_recv() {
                        Ok(reply) => reply,
                        Err(_) => Err(CapsyncError::WorkerExited),
                    };
                }
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!(generation = self.generation, id, %verb, timeout_ms, "Worker request timed out");
                Err(CapsyncError::request_timeout(verb.as_str(), timeout_ms))
            }
        }
    }

    fn route(&self, id: Option<u64>, verb: Verb, outcome: &Result<Value, String>) -> Routed {
        let mut requests = self.requests();
        let key = match id {
            Some(id) => requests
                .pending
                .get(&id)
                .filter(|p| p.expected == verb)
                .map(|_| id),
            None => requests
                .pending
                .iter()
                .filter(|(_, p)| p.expected == verb)
                .map(|(id, _)| *id)
                .min(),
        };

        if let Some(entry) = key.and_then(|k| requests.pending.remove(&k)) {
            let reply = outcome
                .clone()
                .map_err(|message| CapsyncError::worker_request(verb.as_str(), message));
            let _ = entry.reply.send(reply);
            return Routed::Delivered;
        }

        match id {
            Some(id) if requests.abandoned.remove(&id).is_some() => Routed::Late,
            _ => Routed::Unmatched,
        }
    }

    /// Route a response to its waiting request.
    fn resolve(self: &Arc<Self>, id: Option<u64>, verb: Verb, outcome: Result<Value, String>) {
        match self.route(id, verb, &outcome) {
            Routed::Delivered => return,
            Routed::Unmatched => {
                tracing::warn!(generation = self.generation, ?id, %verb, "Discarding unmatched worker response");
                return;
            }
            Routed::Late => {}
        }

        tracing::warn!(generation = self.generation, ?id, %verb, ok = outcome.is_ok(), "Discarding late worker response");
        let _ = self.events.send(WorkerEvent::LateResponse { id, verb });

        if verb == Verb::StartRecording && outcome.is_ok() {
            let shared = self.clone();
            tokio::spawn(async move {
                tracing::warn!(generation = shared.generation, "Reclaiming recording started after its request timed out");
                let timeout = shared.reclaim_timeout;
                if let Err(e) = shared.request(Verb::StopRecording, Value::Null, timeout).await {
                    tracing::error!(generation = shared.generation, error = %e, "Failed to reclaim orphaned recording");
                }
            });
        }
    }

    /// Reject everything still waiting and refuse further requests.
    fn close(&self) {
        if self.lifecycle.send_replace(WorkerLifecycle::Closed) == WorkerLifecycle::Closed {
            return;
        }
        let drained: Vec<(u64, Pending)> = {
            let mut requests = self.requests();
            requests.abandoned.clear();
            requests.pending.drain().collect()
        };
        for (id, pending) in drained {
            tracing::debug!(generation = self.generation, id, verb = %pending.expected, "Rejecting pending request");
            let _ = pending.reply.send(Err(CapsyncError::WorkerExited));
        }
        let _ = self.events.send(WorkerEvent::Exited);
    }
}

async fn read_loop<R>(mut reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin + Send,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(generation = shared.generation, error = %e, "Worker channel failed");
                break;
            }
        };

        let message = match decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(generation = shared.generation, error = %e, "Discarding malformed worker message");
                continue;
            }
        };

        match message {
            Message::Ready => {
                shared.lifecycle.send_replace(WorkerLifecycle::Ready);
                tracing::debug!(generation = shared.generation, "Worker ready");
                let _ = shared.events.send(WorkerEvent::Ready);
            }
            Message::Response { id, verb, outcome } => shared.resolve(id, verb, outcome),
            Message::Event { event, data } => {
                let _ = shared.events.send(WorkerEvent::from_wire(event, data));
            }
            Message::Request { id, verb, .. } => {
                tracing::warn!(generation = shared.generation, id, %verb, "Ignoring request sent by worker");
            }
        }
    }

    tracing::info!(generation = shared.generation, "Worker channel closed");
    shared.close();
}

/// Command line for a worker child: forwarded flags, then the subcommand.
fn worker_args(config: &WorkerConfig) -> Vec<String> {
    let mut args = config.forward_args.clone();
    args.push("worker".to_string());
    args
}

/// Parent-side handle to one worker.
pub struct WorkerHandle {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl WorkerHandle {
    /// Speak the protocol over an arbitrary byte stream pair.
    pub fn connect<R, W>(reader: R, writer: W, config: &WorkerConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (lifecycle, _) = watch::channel(WorkerLifecycle::Starting);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::SeqCst),
            next_id: AtomicU64::new(1),
            requests: Mutex::new(Requests::default()),
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            lifecycle,
            events,
            reclaim_timeout: config.stop_timeout(),
        });
        let reader = tokio::spawn(read_loop(reader, shared.clone()));
        Self {
            shared,
            reader,
            child: None,
        }
    }

    /// Launch a worker process and wait for it to report ready.
    pub async fn spawn(config: &WorkerConfig) -> CapsyncResult<Self> {
        let program = match &config.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };

        let mut child = Command::new(&program)
            .args(worker_args(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CapsyncError::protocol("worker stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CapsyncError::protocol("worker stdout unavailable"))?;

        let mut handle = Self::connect(stdout, stdin, config);
        let generation = handle.generation();
        tracing::info!(generation, pid = ?child.id(), program = %program.display(), "Worker spawned");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "capsync::worker", generation, "{line}");
                }
            });
        }
        handle.child = Some(child);

        if let Err(e) = handle.wait_ready(config.ready_timeout()).await {
            handle.shutdown().await;
            return Err(e);
        }
        Ok(handle)
    }

    /// Wait for the worker's `ready` message.
    pub async fn wait_ready(&self, timeout: Duration) -> CapsyncResult<()> {
        let mut lifecycle = self.shared.lifecycle.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            lifecycle.wait_for(|state| *state != WorkerLifecycle::Starting),
        )
        .await;

        match waited {
            Ok(Ok(state)) if *state == WorkerLifecycle::Ready => Ok(()),
            Ok(_) => Err(CapsyncError::WorkerExited),
            Err(_) => Err(CapsyncError::request_timeout(
                "ready",
                timeout.as_millis() as u64,
            )),
        }
    }

    /// Send a request and wait for its response.
    pub async fn send(&self, verb: Verb, data: Value, timeout: Duration) -> CapsyncResult<Value> {
        self.shared.request(verb, data, timeout).await
    }

    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.shared.events.subscribe()
    }

    pub fn lifecycle(&self) -> WorkerLifecycle {
        self.shared.lifecycle()
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle() == WorkerLifecycle::Closed
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.shared.requests().pending.len()
    }

    /// Timed-out requests whose late response is still being watched for.
    pub fn abandoned_count(&self) -> usize {
        self.shared.requests().abandoned.len()
    }

    /// Close the channel and terminate the worker process.
    ///
    /// Closing stdin lets the worker stop an active recording and exit on
    /// its own; it is killed if that takes longer than the stop timeout.
    pub async fn shutdown(&mut self) {
        self.shared.writer.lock().await.take();
        if let Some(mut child) = self.child.take() {
            let generation = self.generation();
            match tokio::time::timeout(self.shared.reclaim_timeout, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(generation, %status, "Worker exited"),
                Ok(Err(e)) => tracing::warn!(generation, error = %e, "Could not wait for worker"),
                Err(_) => {
                    tracing::warn!(generation, "Worker did not exit in time, killing it");
                    if let Err(e) = child.kill().await {
                        tracing::debug!(generation, error = %e, "Worker already gone");
                    }
                }
            }
        }
        self.reader.abort();
        self.shared.close();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_args_keep_forwarded_flags() {
        let mut config = WorkerConfig::default();
        assert_eq!(worker_args(&config), vec!["worker"]);

        config.forward_args = vec!["--config".into(), "/etc/capsync.json".into(), "--verbose".into()];
        assert_eq!(
            worker_args(&config),
            vec!["--config", "/etc/capsync.json", "--verbose", "worker"]
        );
    }

    #[test]
    fn test_unknown_events_stay_untyped() {
        let event = WorkerEvent::from_wire("permissionChanged".to_string(), Value::Bool(true));
        assert!(matches!(event, WorkerEvent::Other { .. }));

        let event = WorkerEvent::from_wire("timeUpdate".to_string(), Value::from(2));
        assert_eq!(event, WorkerEvent::Session(SessionEvent::TimeUpdate(2)));
    }
}
