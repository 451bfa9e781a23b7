//! # hearth-state
//!
//! Reducer composition and action dispatch for the Hearth host.
//!
//! Each extension registers a private table of state-transition handlers
//! mounted at a [`hearth_core::StatePath`]. Composition merges every table
//! into one state tree with non-overlapping ownership per subtree, then
//! dispatch applies tagged actions against the tree one at a time with
//! copy-on-write semantics: a rejected dispatch leaves the previous tree
//! fully intact.
//!
//! ## Module Overview
//!
//! - [`compose`] — Mount validation and tree construction
//! - [`tree`] — The composed [`tree::StateTree`] and dispatch
//! - [`errors`] — [`errors::StateError`]
//!
//! ## Crate Position
//!
//! Depends on hearth-core only. Depended on by: hearth-extensions,
//! hearth-host.

#![deny(unsafe_code)]

pub mod compose;
pub mod errors;
pub mod tree;

pub use compose::{ReducerMount, TransitionFn, compose};
pub use errors::StateError;
pub use tree::{DispatchOutcome, StateTree};
