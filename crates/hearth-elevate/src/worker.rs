//! Worker-side operation dispatch.
//!
//! The worker process carries a fixed, compiled table mapping operation
//! names to implementations — privileged logic ships as code built into
//! the worker binary, never as generated script text. A request naming an
//! operation absent from the table is answered with a distinct
//! `unknownOperation` error so the host can surface a build-defect
//! diagnostic instead of a generic failure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::errors::ElevationError;
use crate::protocol::{
    INIT_TYPE, RequestFrame, ResponseFrame, WireErrorCode, read_frame, write_frame,
};

/// One privileged operation implementation.
pub type OperationFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// The worker's compiled dispatch table.
#[derive(Default, Clone)]
pub struct OperationTable {
    ops: HashMap<String, OperationFn>,
}

impl OperationTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under a name.
    pub fn register(&mut self, name: impl Into<String>, op: OperationFn) {
        let _ = self.ops.insert(name.into(), op);
    }

    /// Whether an operation is compiled into this table.
    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The built-in deployment operations plus `ping`.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register("ping", Arc::new(|_args| Box::pin(async { Ok(Value::String("pong".into())) })));
        table.register(
            "fs.writeFile",
            Arc::new(|args| {
                Box::pin(async move {
                    let path = str_arg(&args, 0, "path")?.to_string();
                    let contents = str_arg(&args, 1, "contents")?.to_string();
                    if let Some(parent) = Path::new(&path).parent() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| e.to_string())?;
                    }
                    tokio::fs::write(&path, contents)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(Value::Null)
                })
            }),
        );
        table.register(
            "fs.remove",
            Arc::new(|args| {
                Box::pin(async move {
                    let path = str_arg(&args, 0, "path")?.to_string();
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => Ok(Value::Null),
                        Err(e) if e.kind() == std::io::ErrorKind::IsADirectory => {
                            tokio::fs::remove_dir_all(&path)
                                .await
                                .map_err(|e| e.to_string())?;
                            Ok(Value::Null)
                        }
                        Err(e) => Err(e.to_string()),
                    }
                })
            }),
        );
        table.register(
            "link.create",
            Arc::new(|args| {
                Box::pin(async move {
                    let source = str_arg(&args, 0, "source")?.to_string();
                    let dest = str_arg(&args, 1, "dest")?.to_string();
                    create_link(&source, &dest).await.map_err(|e| e.to_string())?;
                    Ok(Value::Null)
                })
            }),
        );
        table
    }
}

fn str_arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {index} ('{name}') must be a string"))
}

#[cfg(unix)]
async fn create_link(source: &str, dest: &str) -> std::io::Result<()> {
    tokio::fs::symlink(source, dest).await
}

#[cfg(windows)]
async fn create_link(source: &str, dest: &str) -> std::io::Result<()> {
    tokio::fs::symlink_file(source, dest).await
}

/// Serve one channel: validate the handshake, then answer requests one at
/// a time in order until the host closes the stream.
pub async fn run_worker<S>(
    stream: S,
    token: &str,
    table: &OperationTable,
) -> Result<(), ElevationError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (read, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);

    // The first frame must be init carrying the launch token.
    let Some(first) = read_frame::<_, RequestFrame>(&mut reader).await? else {
        return Err(ElevationError::Protocol {
            message: "channel closed before init".to_string(),
        });
    };
    if first.kind != INIT_TYPE {
        let response = ResponseFrame::err(WireErrorCode::BadRequest, "expected init");
        write_frame(&mut writer, &response).await?;
        return Err(ElevationError::Protocol {
            message: format!("first frame was '{}', expected init", first.kind),
        });
    }
    let presented = first.args.first().and_then(Value::as_str);
    if presented != Some(token) {
        let response = ResponseFrame::err(WireErrorCode::BadRequest, "channel token mismatch");
        write_frame(&mut writer, &response).await?;
        return Err(ElevationError::Protocol {
            message: "channel token mismatch".to_string(),
        });
    }
    write_frame(&mut writer, &ResponseFrame::ok(Value::Null)).await?;
    info!("worker channel established");

    loop {
        let request = match read_frame::<_, RequestFrame>(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("host closed the channel");
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                // The frame was consumed but is not a request object; answer
                // and keep serving.
                warn!(error = %e, "malformed request frame");
                let response = ResponseFrame::err(WireErrorCode::BadRequest, e.to_string());
                write_frame(&mut writer, &response).await?;
                continue;
            }
            Err(e) => return Err(ElevationError::Io(e)),
        };

        let response = if request.kind == INIT_TYPE {
            ResponseFrame::err(WireErrorCode::BadRequest, "duplicate init")
        } else if let Some(op) = table.ops.get(&request.kind) {
            debug!(operation = %request.kind, "running operation");
            match op(request.args).await {
                Ok(result) => ResponseFrame::ok(result),
                Err(message) => ResponseFrame::err(WireErrorCode::OperationFailed, message),
            }
        } else {
            warn!(operation = %request.kind, "operation not compiled into this worker");
            ResponseFrame::err(
                WireErrorCode::UnknownOperation,
                format!("operation '{}' is not compiled into this worker", request.kind),
            )
        };
        write_frame(&mut writer, &response).await?;
    }
}

/// Dial the host's loopback listener and serve the channel.
///
/// Entry point for the elevated worker process, handed the port and token
/// from its command line.
pub async fn connect_and_serve(
    port: u16,
    token: &str,
    table: &OperationTable,
) -> Result<(), ElevationError> {
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;
    run_worker(stream, token, table).await
}
