//! # hearth-core
//!
//! Foundation types for the Hearth extension host.
//!
//! This crate provides the shared vocabulary that all other Hearth crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::ExtensionName`] as a newtype over the extension's
//!   declared identity
//! - **State paths**: [`paths::StatePath`] addressing subtrees of the composed
//!   state tree
//! - **Actions**: [`actions::Action`] and [`actions::ActionTag`] dispatched
//!   against mounted reducers
//! - **Logging**: [`logging::init_logging`] wiring `tracing-subscriber`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other hearth crates.

#![deny(unsafe_code)]

pub mod actions;
pub mod ids;
pub mod logging;
pub mod paths;

pub use actions::{Action, ActionTag};
pub use ids::ExtensionName;
pub use paths::StatePath;
