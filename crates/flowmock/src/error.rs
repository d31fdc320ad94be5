//! Error taxonomy for the harness.
//!
//! Configuration errors fail fast at rule-registration or trace-build time.
//! Lookup errors are distinct, named failures so tests can tell "this action
//! legitimately has no output" apart from "I queried the wrong name". Run
//! errors are fatal to the test and carry whatever diagnostics were available.

use std::time::Duration;

use crate::trace::history::RunHistory;

/// Errors raised while configuring rules or building a trace index.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rule sets both exact and excluded match positions")]
    ConflictingCountFilter,
    #[error("rule configured a count filter with no positions")]
    EmptyCountFilter,
    #[error("match positions are 1-based; 0 is not a valid position")]
    ZeroMatchPosition,
    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPathPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("dispatcher is sealed; rules must be registered before the run starts")]
    SealedDispatcher,
    #[error("action name '{name}' appears in unrelated scopes; rename one of them")]
    AmbiguousActionName { name: String },
}

/// Errors raised by trace-index queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("action '{name}' never executed in this run")]
    NotFound { name: String },
    #[error("action '{name}' has {available} repetition(s), requested {requested}")]
    RepetitionOutOfRange {
        name: String,
        requested: usize,
        available: usize,
    },
    #[error("action '{name}' repetition {repetition} recorded no input")]
    NoInputRecorded { name: String, repetition: usize },
    #[error("action '{name}' repetition {repetition} recorded no output")]
    NoOutputRecorded { name: String, repetition: usize },
}

/// Errors from the workflow runtime boundary.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("emulator request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode emulator response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("trigger response carried no run identifier")]
    MissingRunId,
    #[error("emulator returned {status}: {body}")]
    Emulator { status: u16, body: String },
}

/// Errors that abort a test run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The run never reached a terminal state within the configured timeout.
    /// Carries the partial history, when one could be fetched, for diagnostics.
    #[error("workflow run '{run_id}' did not reach a terminal state within {waited:?}")]
    Timeout {
        run_id: String,
        waited: Duration,
        partial: Option<RunHistory>,
    },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A simulated transport-level failure, propagated to the workflow runtime
/// exactly as a real network failure would be. Never conflated with an HTTP
/// error status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("simulated transport failure ({kind:?}): {message}")]
pub struct TransportError {
    pub kind: crate::dispatch::plan::FailureKind,
    pub message: String,
}
