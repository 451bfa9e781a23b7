//! Wire messages exchanged with the elevated worker.
//!
//! Frames are newline-free JSON objects, delimiter-framed with `\n`, over a
//! local loopback stream. Host to worker: `{"type": "init", "args": [...]}`
//! first, then `{"type": <operation>, "args": [...]}`. Worker to host:
//! `{"result": ...}` or `{"error": {"code": ..., "message": ...}}`.
//!
//! The protocol carries no correlation ID: messages and responses are 1:1
//! and strictly alternating on a channel, enforced structurally by the
//! command queue's single driver task. Concurrent multiplexing over one
//! channel would require adding an explicit ID field to [`RequestFrame`].

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// The reserved request type establishing worker identity and config.
pub const INIT_TYPE: &str = "init";

/// A named privileged operation with its serialized arguments.
///
/// Created by the caller of the bridge; consumed exactly once by the
/// worker. Every argument must be independently serializable — no live
/// object references cross the process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevatedTask {
    /// Operation name resolved against the worker's dispatch table.
    pub operation: String,
    /// Ordered operation arguments.
    pub args: Vec<Value>,
}

impl ElevatedTask {
    /// Build a task.
    pub fn new(operation: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }
}

/// Host-to-worker frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// `init` for the handshake, the operation name otherwise.
    #[serde(rename = "type")]
    pub kind: String,
    /// Frame arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl RequestFrame {
    /// The handshake frame carrying the channel token and worker config.
    pub fn init(token: &str, config: Value) -> Self {
        Self {
            kind: INIT_TYPE.to_string(),
            args: vec![Value::String(token.to_string()), config],
        }
    }

    /// A frame for a named operation.
    pub fn task(task: &ElevatedTask) -> Self {
        Self {
            kind: task.operation.clone(),
            args: task.args.clone(),
        }
    }
}

/// Machine-readable failure category on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireErrorCode {
    /// The request named an operation absent from the worker's compiled
    /// dispatch table.
    UnknownOperation,
    /// The operation ran and failed for domain reasons.
    OperationFailed,
    /// The frame was not a valid request object.
    BadRequest,
}

/// Error payload of a worker response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
    /// Failure category.
    pub code: WireErrorCode,
    /// Human-readable message, carried verbatim to the caller.
    pub message: String,
}

/// Worker-to-host frame: exactly one per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseFrame {
    /// Successful operation result.
    Result {
        /// Operation output.
        result: Value,
    },
    /// Failed operation.
    Error {
        /// Failure payload.
        error: WireError,
    },
}

impl ResponseFrame {
    /// A success response.
    pub fn ok(result: Value) -> Self {
        Self::Result { result }
    }

    /// A failure response.
    pub fn err(code: WireErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: WireError {
                code,
                message: message.into(),
            },
        }
    }
}

/// Write one frame: compact JSON followed by the `\n` delimiter.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Read one frame. Returns `Ok(None)` on clean EOF.
pub async fn read_frame<R, T>(reader: &mut BufReader<R>) -> std::io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Ok(None);
    }
    let frame = serde_json::from_str(line.trim_end())?;
    Ok(Some(frame))
}
