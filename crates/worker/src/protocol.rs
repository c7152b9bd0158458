//! Worker wire protocol.
//!
//! Every frame is a 4-byte big-endian length followed by one JSON message.
//! Three message families share one flat schema:
//!
//! | family   | `type`                 | carries                          |
//! |----------|------------------------|----------------------------------|
//! | request  | verb                   | `id`, `data`                     |
//! | response | `<verb>:response`      | `id`, `success`, `data`/`error`  |
//! | event    | `event`                | `event`, `data`                  |
//!
//! plus a bare `ready` sent once by the worker.

use std::path::PathBuf;

use capsync_capture_engine::RecordingOptions;
use capsync_common::error::{CapsyncError, CapsyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const READY: &str = "ready";
pub const EVENT: &str = "event";
pub const RESPONSE_SUFFIX: &str = ":response";

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Request verbs understood by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    GetDisplays,
    GetWindows,
    StartRecording,
    StopRecording,
    GetStatus,
    Ping,
}

impl Verb {
    pub const ALL: [Verb; 6] = [
        Verb::GetDisplays,
        Verb::GetWindows,
        Verb::StartRecording,
        Verb::StopRecording,
        Verb::GetStatus,
        Verb::Ping,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetDisplays => "getDisplays",
            Self::GetWindows => "getWindows",
            Self::StartRecording => "startRecording",
            Self::StopRecording => "stopRecording",
            Self::GetStatus => "getStatus",
            Self::Ping => "ping",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }

    pub fn response_type(self) -> String {
        format!("{}{RESPONSE_SUFFIX}", self.as_str())
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The flat JSON shape of every message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ready,
    Request {
        id: u64,
        verb: Verb,
        data: Value,
    },
    Response {
        id: Option<u64>,
        verb: Verb,
        outcome: Result<Value, String>,
    },
    Event {
        event: String,
        data: Value,
    },
}

impl Message {
    pub fn to_wire(&self) -> WireMessage {
        match self {
            Self::Ready => WireMessage {
                kind: READY.to_string(),
                ..Default::default()
            },
            Self::Request { id, verb, data } => WireMessage {
                kind: verb.as_str().to_string(),
                id: Some(*id),
                data: (!data.is_null()).then(|| data.clone()),
                ..Default::default()
            },
            Self::Response { id, verb, outcome } => {
                let (success, data, error) = match outcome {
                    Ok(data) => (true, Some(data.clone()), None),
                    Err(error) => (false, None, Some(error.clone())),
                };
                WireMessage {
                    kind: verb.response_type(),
                    id: *id,
                    data,
                    success: Some(success),
                    error,
                    event: None,
                }
            }
            Self::Event { event, data } => WireMessage {
                kind: EVENT.to_string(),
                event: Some(event.clone()),
                data: Some(data.clone()),
                ..Default::default()
            },
        }
    }

    pub fn from_wire(wire: WireMessage) -> CapsyncResult<Self> {
        if wire.kind == READY {
            return Ok(Self::Ready);
        }

        if wire.kind == EVENT {
            let event = wire
                .event
                .ok_or_else(|| CapsyncError::protocol("event message without event name"))?;
            return Ok(Self::Event {
                event,
                data: wire.data.unwrap_or(Value::Null),
            });
        }

        if let Some(verb_name) = wire.kind.strip_suffix(RESPONSE_SUFFIX) {
            let verb = Verb::parse(verb_name).ok_or_else(|| {
                CapsyncError::protocol(format!("response for unknown verb {verb_name}"))
            })?;
            let outcome = if wire.success.unwrap_or(false) {
                Ok(wire.data.unwrap_or(Value::Null))
            } else {
                Err(wire.error.unwrap_or_else(|| "unknown worker error".to_string()))
            };
            return Ok(Self::Response {
                id: wire.id,
                verb,
                outcome,
            });
        }

        let verb = Verb::parse(&wire.kind)
            .ok_or_else(|| CapsyncError::protocol(format!("unknown message type {}", wire.kind)))?;
        let id = wire
            .id
            .ok_or_else(|| CapsyncError::protocol(format!("{verb} request without id")))?;
        Ok(Self::Request {
            id,
            verb,
            data: wire.data.unwrap_or(Value::Null),
        })
    }
}

/// Payload of a `startRecording` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    pub output_path: PathBuf,
    #[serde(default)]
    pub options: RecordingOptions,
}

pub fn encode(message: &Message) -> CapsyncResult<Vec<u8>> {
    Ok(serde_json::to_vec(&message.to_wire())?)
}

pub fn decode(frame: &[u8]) -> CapsyncResult<Message> {
    let wire: WireMessage = serde_json::from_slice(frame)?;
    Message::from_wire(wire)
}

/// Write one framed message and flush.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> CapsyncResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = encode(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CapsyncError::protocol(format!(
            "frame of {} bytes exceeds limit",
            body.len()
        )));
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one raw frame. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> CapsyncResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(CapsyncError::protocol(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
