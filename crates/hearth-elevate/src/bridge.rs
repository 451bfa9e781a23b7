//! Establishing the channel to a separately-privileged worker.
//!
//! The bridge binds a loopback listener, generates a channel token, asks a
//! [`WorkerLauncher`] to start the privileged process with the endpoint,
//! and waits — within a bounded connect timeout, the only timeout the
//! bridge itself enforces — for the worker to dial back. The handshake
//! (`init` carrying the token) is answered by the worker before any
//! operation is sent; the connected channel is then handed to a
//! [`CommandQueue`].
//!
//! Launching is the only step requiring interactive user confirmation; a
//! refusal by the user or the OS is surfaced as the distinct
//! [`ElevationError::Denied`], never as a generic failure, and is not
//! retried automatically.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ElevationError;
use crate::protocol::{RequestFrame, ResponseFrame, read_frame, write_frame};
use crate::queue::CommandQueue;
use crate::worker::{OperationTable, run_worker};

/// Exit codes privilege-elevation front ends use for a refused prompt.
const DENIAL_EXIT_CODES: [i32; 2] = [126, 127];

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct ElevationConfig {
    /// Bound on the wait for the worker to connect back and complete the
    /// handshake.
    pub connect_timeout: Duration,
    /// Opaque worker configuration shipped in the init frame.
    pub worker_config: Value,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            worker_config: Value::Null,
        }
    }
}

/// Where the launched worker must dial back to.
#[derive(Debug, Clone)]
pub struct WorkerEndpoint {
    /// Loopback port of the host's listener.
    pub port: u16,
    /// Host-generated unique channel token.
    pub token: String,
}

/// Outcome of asking the platform to start the worker.
///
/// `denial` resolves if the launched process dies before connecting —
/// notably when the elevation prompt was refused.
pub struct LaunchHandle {
    /// Early-exit watcher, when the launcher can observe the process.
    pub denial: Option<oneshot::Receiver<ElevationError>>,
}

impl LaunchHandle {
    /// A handle with no early-exit observation.
    pub fn detached() -> Self {
        Self { denial: None }
    }
}

/// Seam for starting the privileged worker process.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start the worker, pointing it at `endpoint`.
    async fn launch(&self, endpoint: &WorkerEndpoint) -> Result<LaunchHandle, ElevationError>;
}

/// Production launcher: runs the worker program under a configurable
/// elevation command prefix (e.g. `pkexec`).
pub struct PrivilegedLauncher {
    /// Elevation front end and its arguments; empty to run unelevated.
    pub elevation_command: Vec<String>,
    /// Path to the worker executable (normally the host binary itself,
    /// invoked with its `worker` subcommand).
    pub worker_program: PathBuf,
}

#[async_trait]
impl WorkerLauncher for PrivilegedLauncher {
    async fn launch(&self, endpoint: &WorkerEndpoint) -> Result<LaunchHandle, ElevationError> {
        let mut command = match self.elevation_command.split_first() {
            Some((program, prefix_args)) => {
                let mut command = tokio::process::Command::new(program);
                let _ = command.args(prefix_args).arg(&self.worker_program);
                command
            }
            None => tokio::process::Command::new(&self.worker_program),
        };
        let _ = command.args([
            "worker",
            "--port",
            &endpoint.port.to_string(),
            "--token",
            &endpoint.token,
        ]);

        debug!(port = endpoint.port, "launching privileged worker");
        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ElevationError::Denied {
                    reason: e.to_string(),
                }
            } else {
                ElevationError::Io(e)
            }
        })?;

        // Watch for the process dying before it ever connects. After the
        // bridge connects it drops the receiver and the send is a no-op.
        let (tx, rx) = oneshot::channel();
        let _watcher = tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => status,
                Err(e) => {
                    let _ = tx.send(ElevationError::Io(e));
                    return;
                }
            };
            if status.success() {
                return;
            }
            let error = match status.code() {
                Some(code) if DENIAL_EXIT_CODES.contains(&code) => ElevationError::Denied {
                    reason: format!("elevation prompt refused (status {code})"),
                },
                Some(code) => ElevationError::Protocol {
                    message: format!("worker exited before connecting (status {code})"),
                },
                None => ElevationError::Protocol {
                    message: "worker killed before connecting".to_string(),
                },
            };
            let _ = tx.send(error);
        });

        Ok(LaunchHandle { denial: Some(rx) })
    }
}

/// Launcher running the worker loop on a local task.
///
/// Used by tests and by unelevated development mode; speaks the identical
/// wire protocol over the identical loopback channel.
pub struct InProcessLauncher {
    table: OperationTable,
}

impl InProcessLauncher {
    /// Serve the given operation table in-process.
    pub fn new(table: OperationTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, endpoint: &WorkerEndpoint) -> Result<LaunchHandle, ElevationError> {
        let table = self.table.clone();
        let port = endpoint.port;
        let token = endpoint.token.clone();
        let _worker = tokio::spawn(async move {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => {
                    if let Err(e) = run_worker(stream, &token, &table).await {
                        warn!(error = %e, "in-process worker exited with error");
                    }
                }
                Err(e) => warn!(error = %e, "in-process worker failed to connect"),
            }
        });
        Ok(LaunchHandle::detached())
    }
}

/// Establishes elevated worker channels.
pub struct ElevationBridge;

impl ElevationBridge {
    /// Launch a worker and hand back the connected, handshaken channel.
    pub async fn establish(
        launcher: &dyn WorkerLauncher,
        config: &ElevationConfig,
    ) -> Result<CommandQueue, ElevationError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let token = Uuid::now_v7().to_string();
        let endpoint = WorkerEndpoint {
            port,
            token: token.clone(),
        };

        let mut launched = launcher.launch(&endpoint).await?;

        let deadline = tokio::time::Instant::now() + config.connect_timeout;
        let stream = tokio::select! {
            accepted = listener.accept() => accepted?.0,
            error = watch_denial(&mut launched) => return Err(error),
            () = tokio::time::sleep_until(deadline) => {
                warn!(port, "worker did not connect in time");
                return Err(ElevationError::ConnectTimeout {
                    waited_ms: config.connect_timeout.as_millis() as u64,
                });
            }
        };
        debug!(port, "worker connected, performing handshake");

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        // First message on the channel: init with the token, answered
        // before anything else is sent. Still under the connect deadline.
        let handshake = async {
            write_frame(
                &mut write_half,
                &RequestFrame::init(&token, config.worker_config.clone()),
            )
            .await?;
            read_frame::<_, ResponseFrame>(&mut reader).await
        };
        let answer = tokio::time::timeout_at(deadline, handshake)
            .await
            .map_err(|_| ElevationError::ConnectTimeout {
                waited_ms: config.connect_timeout.as_millis() as u64,
            })??;

        match answer {
            Some(ResponseFrame::Result { .. }) => {
                info!(port, "elevated worker channel established");
                Ok(CommandQueue::new(reader, write_half))
            }
            Some(ResponseFrame::Error { error }) => Err(ElevationError::Protocol {
                message: format!("worker rejected init: {}", error.message),
            }),
            None => Err(ElevationError::Protocol {
                message: "worker closed the channel during handshake".to_string(),
            }),
        }
    }
}

async fn watch_denial(launched: &mut LaunchHandle) -> ElevationError {
    match launched.denial.take() {
        Some(rx) => match rx.await {
            Ok(error) => error,
            // Watcher dropped without reporting; leave it to the timeout.
            Err(_) => futures::future::pending().await,
        },
        None => futures::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::protocol::ElevatedTask;

    struct NeverLauncher;

    #[async_trait]
    impl WorkerLauncher for NeverLauncher {
        async fn launch(&self, _endpoint: &WorkerEndpoint) -> Result<LaunchHandle, ElevationError> {
            Ok(LaunchHandle::detached())
        }
    }

    struct RefusingLauncher;

    #[async_trait]
    impl WorkerLauncher for RefusingLauncher {
        async fn launch(&self, _endpoint: &WorkerEndpoint) -> Result<LaunchHandle, ElevationError> {
            Err(ElevationError::Denied {
                reason: "user dismissed the prompt".to_string(),
            })
        }
    }

    /// Connects with the wrong token to exercise handshake rejection.
    struct WrongTokenLauncher;

    #[async_trait]
    impl WorkerLauncher for WrongTokenLauncher {
        async fn launch(&self, endpoint: &WorkerEndpoint) -> Result<LaunchHandle, ElevationError> {
            let port = endpoint.port;
            let _worker = tokio::spawn(async move {
                if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
                    let table = OperationTable::builtin();
                    let _ = run_worker(stream, "not-the-token", &table).await;
                }
            });
            Ok(LaunchHandle::detached())
        }
    }

    #[tokio::test]
    async fn establish_and_round_trip() {
        let launcher = InProcessLauncher::new(OperationTable::builtin());
        let queue = ElevationBridge::establish(&launcher, &ElevationConfig::default())
            .await
            .unwrap();

        let result = queue
            .submit(ElevatedTask::new("ping", vec![]))
            .await
            .unwrap();
        assert_eq!(result, json!("pong"));
        queue.close().await;
    }

    #[tokio::test]
    async fn connect_timeout_is_distinct() {
        let config = ElevationConfig {
            connect_timeout: Duration::from_millis(100),
            worker_config: Value::Null,
        };
        let result = ElevationBridge::establish(&NeverLauncher, &config).await;
        assert_matches!(result, Err(ElevationError::ConnectTimeout { .. }));
    }

    #[tokio::test]
    async fn refusal_surfaces_as_denied() {
        let result =
            ElevationBridge::establish(&RefusingLauncher, &ElevationConfig::default()).await;
        assert_matches!(result, Err(ElevationError::Denied { .. }));
        assert!(!result.unwrap_err().retry_plausible());
    }

    #[tokio::test]
    async fn early_exit_reported_through_launch_handle() {
        struct DyingLauncher;

        #[async_trait]
        impl WorkerLauncher for DyingLauncher {
            async fn launch(
                &self,
                _endpoint: &WorkerEndpoint,
            ) -> Result<LaunchHandle, ElevationError> {
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(ElevationError::Denied {
                    reason: "elevation prompt refused (status 126)".to_string(),
                });
                Ok(LaunchHandle { denial: Some(rx) })
            }
        }

        let result =
            ElevationBridge::establish(&DyingLauncher, &ElevationConfig::default()).await;
        assert_matches!(result, Err(ElevationError::Denied { .. }));
    }

    #[tokio::test]
    async fn token_mismatch_fails_the_handshake() {
        let result =
            ElevationBridge::establish(&WrongTokenLauncher, &ElevationConfig::default()).await;
        assert_matches!(result, Err(ElevationError::Protocol { .. }));
    }

    #[tokio::test]
    async fn fresh_channel_is_unaffected_by_a_previous_failure() {
        // A denied establish, then a working one: failures are scoped to
        // their own channel.
        let _ = ElevationBridge::establish(&RefusingLauncher, &ElevationConfig::default()).await;

        let launcher = InProcessLauncher::new(OperationTable::builtin());
        let queue = ElevationBridge::establish(&launcher, &ElevationConfig::default())
            .await
            .unwrap();
        let result = queue.submit(ElevatedTask::new("ping", vec![])).await;
        assert!(result.is_ok());
        queue.close().await;
    }
}
