//! Flowmock: a local workflow-testing harness.
//!
//! Run an orchestrated workflow definition against a local emulator,
//! intercept every outbound call it makes, and assert on both the
//! intercepted traffic and the post-run execution trace.
//!
//! Two engines do the heavy lifting:
//!
//! - [`dispatch::MockDispatcher`] resolves each outbound call against an
//!   ordered list of expectations, with call-count-dependent matching,
//!   fallthrough semantics, delay injection, and simulated transport
//!   failures.
//! - [`trace::TraceIndex`] flattens the nested, loop-annotated run history
//!   into repetition-indexed lookups (status/input/output per action, per
//!   occurrence).
//!
//! [`runner::TestRunner`] ties them together for one test: register rules,
//! fire the trigger, wait for the run to finish, query the trace.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod probe;
pub mod runner;
pub mod runtime;
pub mod trace;

pub use config::HarnessConfig;
pub use dispatch::plan::{
    BodySource, CallContext, DelaySpec, FailureKind, FailureSpec, MockResponse, ResponsePlan,
};
pub use dispatch::predicate::{BodyPredicate, MockRequest, PathMatch, RequestPredicate};
pub use dispatch::recording::{CallOutcome, RecordedCall};
pub use dispatch::rules::{CountFilter, MatchRule};
pub use dispatch::{DispatchOutcome, Fallback, MockDispatcher};
pub use error::{ConfigError, LookupError, RunError, RuntimeError, TransportError};
pub use probe::{is_reachable, ProbeConfig};
pub use runner::{CompletedRun, TestRunner};
pub use runtime::{
    HttpEmulatorClient, TriggerRequest, TriggerResponse, WorkflowRuntime, RUN_ID_HEADER,
};
pub use trace::{ActionStatus, RunHistory, RunStatus, TraceIndex, TraceNode};
