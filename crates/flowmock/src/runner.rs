//! Per-test orchestration.
//!
//! A `TestRunner` owns one mock dispatcher and one view of the workflow
//! runtime. It registers the test's rules, fires the trigger, blocks until
//! the run reaches a terminal state (or the configured timeout, which is
//! fatal to the test), then builds the trace index and hands everything back
//! for assertions. Dropping the runner discards all rules, counters, and
//! recorded calls; nothing leaks into the next test.

use std::sync::Arc;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::dispatch::recording::RecordedCall;
use crate::dispatch::rules::MatchRule;
use crate::dispatch::{Fallback, MockDispatcher};
use crate::error::{ConfigError, RunError};
use crate::runtime::{TriggerRequest, TriggerResponse, WorkflowRuntime};
use crate::trace::history::RunHistory;
use crate::trace::index::TraceIndex;

/// Everything a test can assert on after one completed run.
#[derive(Debug)]
pub struct CompletedRun {
    pub trigger_response: TriggerResponse,
    pub history: RunHistory,
    pub trace: TraceIndex,
    pub calls: Vec<RecordedCall>,
}

/// Orchestrates one workflow test run.
pub struct TestRunner {
    config: HarnessConfig,
    runtime: Arc<dyn WorkflowRuntime>,
    dispatcher: Arc<MockDispatcher>,
}

impl TestRunner {
    pub fn new(config: HarnessConfig, runtime: Arc<dyn WorkflowRuntime>) -> Self {
        Self::with_dispatcher(config, runtime, Arc::new(MockDispatcher::new()))
    }

    /// Build a runner around a caller-constructed dispatcher. Useful when the
    /// runtime implementation has to be wired to the dispatcher before the
    /// runner exists.
    pub fn with_dispatcher(
        config: HarnessConfig,
        runtime: Arc<dyn WorkflowRuntime>,
        dispatcher: Arc<MockDispatcher>,
    ) -> Self {
        Self {
            config,
            runtime,
            dispatcher,
        }
    }

    /// The dispatcher to hand to the workflow runtime as its outbound-call
    /// resolver.
    pub fn dispatcher(&self) -> Arc<MockDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Register a rule; only valid before the run starts.
    pub fn register(&self, rule: MatchRule) -> Result<(), ConfigError> {
        self.dispatcher.register(rule)
    }

    pub fn set_fallback(&self, fallback: Fallback) -> Result<(), ConfigError> {
        self.dispatcher.set_fallback(fallback)
    }

    /// Fire the trigger and block until the run is terminal. A run that
    /// never reaches a terminal state within the configured timeout is a
    /// test-fatal [`RunError::Timeout`], reported with whatever partial
    /// history could be fetched.
    pub async fn run_trigger(&self, request: TriggerRequest) -> Result<CompletedRun, RunError> {
        self.dispatcher.seal();

        let trigger_response = self.runtime.trigger(request).await?;
        let run_id = trigger_response.run_id.clone();
        info!(%run_id, status = trigger_response.status, "workflow trigger invoked");

        let deadline = Instant::now() + self.config.run_timeout();
        loop {
            let status = self.runtime.run_status(&run_id).await?;
            if status.is_terminal() {
                debug!(%run_id, ?status, "workflow run reached terminal state");
                break;
            }
            if Instant::now() >= deadline {
                warn!(%run_id, "workflow run timed out before reaching a terminal state");
                let partial = self.runtime.run_history(&run_id).await.ok();
                return Err(RunError::Timeout {
                    run_id,
                    waited: self.config.run_timeout(),
                    partial,
                });
            }
            sleep(self.config.poll_interval()).await;
        }

        let history = self.runtime.run_history(&run_id).await?;
        let trace = TraceIndex::build(&history)?;
        let calls = self.dispatcher.recorded_calls();
        info!(%run_id, actions = trace.action_names().len(), calls = calls.len(), "run indexed");

        Ok(CompletedRun {
            trigger_response,
            history,
            trace,
            calls,
        })
    }
}
