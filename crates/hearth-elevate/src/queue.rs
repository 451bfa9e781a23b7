//! FIFO command queue over one worker channel.
//!
//! Exactly one request is in flight at a time; additional submissions are
//! held in order and dispatched only after the current one resolves. The
//! wire protocol carries no correlation ID, so matching is positional — a
//! deliberate design constraint preserved here structurally: a single
//! driver task owns both stream halves, writes one frame, and reads one
//! frame before touching the next request. On channel termination every
//! outstanding request (queued or in flight) is failed with
//! [`ElevationError::WorkerTerminated`], never left hanging.

use std::time::Instant;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ElevationError;
use crate::protocol::{
    ElevatedTask, RequestFrame, ResponseFrame, WireErrorCode, read_frame, write_frame,
};

/// Queue depth before submitters are backpressured.
const QUEUE_CAPACITY: usize = 64;

struct PendingRequest {
    task: ElevatedTask,
    reply: oneshot::Sender<Result<Value, ElevationError>>,
    queued_at: Instant,
}

/// Serializes privileged calls over one worker channel.
pub struct CommandQueue {
    tx: mpsc::Sender<PendingRequest>,
    driver: JoinHandle<()>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue").finish_non_exhaustive()
    }
}

impl CommandQueue {
    /// Take ownership of a connected channel and start the driver task.
    ///
    /// The reader is taken as an existing `BufReader` so a handshake
    /// performed before the queue starts keeps its buffered bytes.
    pub fn new<R, W>(reader: BufReader<R>, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let driver = tokio::spawn(drive(reader, writer, rx, cancel.clone()));
        Self { tx, driver, cancel }
    }

    /// Submit a task; resolves when its matching response arrives or the
    /// channel terminates.
    ///
    /// No cancellation is carried on the wire — a caller that no longer
    /// needs the result still waits for it (or for channel close).
    /// Timeouts are the caller's responsibility at the call site.
    pub async fn submit(&self, task: ElevatedTask) -> Result<Value, ElevationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = PendingRequest {
            task,
            reply: reply_tx,
            queued_at: Instant::now(),
        };
        if self.tx.send(pending).await.is_err() {
            return Err(ElevationError::WorkerTerminated);
        }
        reply_rx
            .await
            .unwrap_or(Err(ElevationError::WorkerTerminated))
    }

    /// Close the channel cleanly: already-queued requests are dispatched
    /// and resolved first, then the driver exits.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.driver.await;
    }

    /// Tear the channel down immediately; outstanding requests fail with
    /// [`ElevationError::WorkerTerminated`].
    pub async fn terminate(self) {
        self.cancel.cancel();
        drop(self.tx);
        let _ = self.driver.await;
    }
}

async fn drive<R, W>(
    mut reader: BufReader<R>,
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    loop {
        let pending = tokio::select! {
            () = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(p) => p,
                // All senders dropped after a clean close.
                None => break,
            },
        };

        // One request in flight: write the frame, then read exactly one
        // response before looking at the queue again. Teardown must also
        // interrupt a request the worker never answers.
        let exchange = async {
            write_frame(&mut writer, &RequestFrame::task(&pending.task)).await?;
            read_frame::<_, ResponseFrame>(&mut reader).await
        };
        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                let _ = pending.reply.send(Err(ElevationError::WorkerTerminated));
                break;
            }
            outcome = exchange => outcome,
        };

        match outcome {
            Ok(Some(response)) => {
                debug!(
                    operation = %pending.task.operation,
                    queued_ms = pending.queued_at.elapsed().as_millis() as u64,
                    "elevated request resolved"
                );
                let _ = pending.reply.send(map_response(response, &pending.task));
            }
            Ok(None) => {
                warn!(operation = %pending.task.operation, "worker channel closed mid-request");
                let _ = pending.reply.send(Err(ElevationError::WorkerTerminated));
                break;
            }
            Err(e) => {
                warn!(operation = %pending.task.operation, error = %e, "worker channel failed");
                let _ = pending.reply.send(Err(ElevationError::WorkerTerminated));
                break;
            }
        }
    }

    // Fail everything still queued; nothing may hang forever.
    rx.close();
    while let Ok(pending) = rx.try_recv() {
        let _ = pending.reply.send(Err(ElevationError::WorkerTerminated));
    }
}

fn map_response(response: ResponseFrame, task: &ElevatedTask) -> Result<Value, ElevationError> {
    match response {
        ResponseFrame::Result { result } => Ok(result),
        ResponseFrame::Error { error } => Err(match error.code {
            WireErrorCode::UnknownOperation => ElevationError::UnknownOperation {
                operation: task.operation.clone(),
            },
            WireErrorCode::OperationFailed => ElevationError::Operation(error.message),
            WireErrorCode::BadRequest => ElevationError::BadRequest {
                message: error.message,
            },
        }),
    }
}
