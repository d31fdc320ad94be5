//! Workflow execution-trace query engine.
//!
//! [`history`] mirrors the emulator's run-history document; [`index`] turns
//! one completed run into a flat, repetition-indexed lookup structure.

pub mod history;
pub mod index;

pub use history::{ActionStatus, RunHistory, RunStatus};
pub use index::{TraceIndex, TraceNode};
