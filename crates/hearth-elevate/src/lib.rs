//! # hearth-elevate
//!
//! The bridge between the Hearth host and its separately-privileged worker
//! process.
//!
//! Operations that need elevated operating-system privileges (deploying
//! files into protected game directories, mostly) are shipped to a worker
//! process as named operations with serializable arguments — never as
//! generated code. The worker carries a compiled dispatch table, connects
//! back over a loopback channel identified by a host-generated token, and
//! answers requests one at a time.
//!
//! ## Module Overview
//!
//! - [`protocol`] — Line-framed JSON wire messages and framing helpers
//! - [`queue`] — FIFO command queue enforcing request/response alternation
//! - [`bridge`] — Listener, launcher seam, token handshake, connect timeout
//! - [`worker`] — Worker-side operation table and serve loop
//! - [`errors`] — [`errors::ElevationError`]
//!
//! ## Crate Position
//!
//! Standalone (no hearth crate dependencies). Depended on by: hearth-host.

#![deny(unsafe_code)]

pub mod bridge;
pub mod errors;
pub mod protocol;
pub mod queue;
pub mod worker;

pub use bridge::{
    ElevationBridge, ElevationConfig, InProcessLauncher, LaunchHandle, PrivilegedLauncher,
    WorkerEndpoint, WorkerLauncher,
};
pub use errors::ElevationError;
pub use protocol::ElevatedTask;
pub use queue::CommandQueue;
pub use worker::OperationTable;
