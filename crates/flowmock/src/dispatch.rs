//! Mock HTTP dispatch engine.
//!
//! The dispatcher holds an ordered list of match rules. For every outbound
//! call a running workflow makes, `intercept` picks the first registered
//! predicate group with a matching base predicate, bumps that group's shared
//! call counter, walks the group's rules in registration order, and serves
//! the first rule whose count filter admits the counter value. Calls no rule
//! serves fall through to a configurable default resolver, terminating in a
//! 200 with no body.
//!
//! Safe for concurrent interception: the rule list is read-only once the run
//! starts (`seal`), counter increments are serialized and gap-free, and the
//! call log preserves arrival order. Delay materialization suspends only the
//! invoking task and holds no lock.

pub mod plan;
pub mod predicate;
pub mod recording;
pub mod rules;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tracing::{debug, warn};

use crate::dispatch::plan::{CallContext, MockResponse};
use crate::dispatch::predicate::{MockRequest, RequestPredicate};
use crate::dispatch::recording::{CallLog, CallOutcome, RecordedCall};
use crate::dispatch::rules::{CountFilter, MatchRule};
use crate::error::{ConfigError, TransportError};

/// Result of one intercepted call. A simulated transport failure is a
/// separate channel from an HTTP error status.
#[derive(Debug)]
pub enum DispatchOutcome {
    Response(MockResponse),
    TransportFailure(TransportError),
}

impl DispatchOutcome {
    pub fn response(&self) -> Option<&MockResponse> {
        match self {
            DispatchOutcome::Response(response) => Some(response),
            DispatchOutcome::TransportFailure(_) => None,
        }
    }

    pub fn unwrap_response(self) -> MockResponse {
        match self {
            DispatchOutcome::Response(response) => response,
            DispatchOutcome::TransportFailure(err) => {
                panic!("expected a response, got transport failure: {err}")
            }
        }
    }
}

/// Default resolver for calls no registered rule serves.
#[derive(Clone)]
pub enum Fallback {
    Fixed(MockResponse),
    Handler(Arc<dyn Fn(&CallContext<'_>) -> MockResponse + Send + Sync>),
}

impl Default for Fallback {
    fn default() -> Self {
        Fallback::Fixed(MockResponse::empty_ok())
    }
}

impl std::fmt::Debug for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fallback::Fixed(response) => f.debug_tuple("Fixed").field(&response.status).finish(),
            Fallback::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// A registered rule with its registration-time artifacts: the validated
/// count filter and the compiled path regex, if any.
struct RegisteredRule {
    rule: MatchRule,
    filter: Option<CountFilter>,
    path_regex: Option<Regex>,
}

impl RegisteredRule {
    fn base_matches(&self, request: &MockRequest) -> bool {
        self.rule
            .predicate
            .matches(self.path_regex.as_ref(), request)
    }
}

/// Stateful mock dispatcher for one test run.
///
/// Owned by a [`crate::runner::TestRunner`]; shared with the workflow runtime
/// behind an `Arc` so every outbound call the workflow makes is resolved here
/// instead of a real network stack.
pub struct MockDispatcher {
    rules: RwLock<Vec<RegisteredRule>>,
    /// One counter per predicate group, keyed by structural equality of the
    /// base predicate. Counters live here, never inside rules.
    counters: Mutex<HashMap<RequestPredicate, u64>>,
    log: CallLog,
    fallback: RwLock<Fallback>,
    sealed: AtomicBool,
}

impl Default for MockDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            counters: Mutex::new(HashMap::new()),
            log: CallLog::new(),
            fallback: RwLock::new(Fallback::default()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Append a rule. Registration order matters: within a predicate group
    /// the first rule whose filter admits the counter value wins, and across
    /// groups the first group with a matching base predicate owns the call.
    pub fn register(&self, rule: MatchRule) -> Result<(), ConfigError> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(ConfigError::SealedDispatcher);
        }
        let filter = rule.count_filter()?;
        let path_regex = rule.predicate.compile()?;
        self.rules.write().push(RegisteredRule {
            rule,
            filter,
            path_regex,
        });
        Ok(())
    }

    /// Replace the default resolver for calls no rule serves.
    pub fn set_fallback(&self, fallback: Fallback) -> Result<(), ConfigError> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(ConfigError::SealedDispatcher);
        }
        *self.fallback.write() = fallback;
        Ok(())
    }

    /// Freeze the rule list for the duration of the run. Further
    /// registration fails with [`ConfigError::SealedDispatcher`].
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Discard counters and the call log, and reopen for registration.
    /// Rules are kept; used when replaying the same configuration.
    pub fn reset_state(&self) {
        self.counters.lock().clear();
        self.log.clear();
        self.sealed.store(false, Ordering::Release);
    }

    /// Calls recorded so far, in arrival order.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.log.snapshot()
    }

    pub fn intercepted_count(&self) -> usize {
        self.log.len()
    }

    /// Current counter value for a predicate group; 0 if no call has
    /// satisfied the base predicate yet.
    pub fn call_count(&self, predicate: &RequestPredicate) -> u64 {
        self.counters.lock().get(predicate).copied().unwrap_or(0)
    }

    /// Resolve one outbound call. Invoked by the workflow runtime for every
    /// call the workflow makes; safe to call concurrently.
    pub async fn intercept(&self, request: MockRequest) -> DispatchOutcome {
        let (outcome, delay) = self.resolve(&request);
        if let Some(duration) = delay {
            // No locks are held here; concurrent intercepts are unaffected.
            debug!(method = %request.method, uri = %request.uri, ?duration, "delaying mock response");
            tokio::time::sleep(duration).await;
        }
        outcome
    }

    /// Synchronous part of interception: rule selection, counter increment,
    /// recording, and response materialization. Returns the outcome plus the
    /// resolved delay for the caller to apply after all locks are released.
    fn resolve(&self, request: &MockRequest) -> (DispatchOutcome, Option<std::time::Duration>) {
        let rules = self.rules.read();

        // The first rule with a matching base predicate identifies the
        // matching family; rules within a family share an equal predicate.
        let family_key = rules
            .iter()
            .find(|r| r.base_matches(request))
            .map(|r| r.rule.predicate.clone());

        let group_position = family_key.as_ref().map(|key| {
            let mut counters = self.counters.lock();
            let counter = counters.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        });

        let selected = family_key.as_ref().and_then(|key| {
            let n = group_position.unwrap_or(0);
            rules
                .iter()
                .filter(|r| r.rule.predicate == *key)
                .find(|r| r.filter.as_ref().is_none_or(|f| f.admits(n)))
        });

        let prior = self.log.snapshot();
        let ctx = CallContext {
            request,
            prior_calls: &prior,
            group_position,
        };

        let (plan, delay) = match selected {
            Some(registered) => {
                debug!(
                    method = %request.method,
                    uri = %request.uri,
                    position = ?group_position,
                    "mock rule matched"
                );
                let delay = registered.rule.plan.delay_spec().map(|d| d.resolve());
                (Some(&registered.rule.plan), delay)
            }
            None => {
                if group_position.is_some() {
                    // Base predicate satisfied but every rule's count filter
                    // rejected this position.
                    warn!(
                        method = %request.method,
                        uri = %request.uri,
                        position = ?group_position,
                        "no rule admitted this call position, using default resolver"
                    );
                } else {
                    debug!(
                        method = %request.method,
                        uri = %request.uri,
                        "no predicate group matched, using default resolver"
                    );
                }
                (None, None)
            }
        };

        let result: Result<MockResponse, TransportError> = match plan {
            Some(plan) => plan.materialize(&ctx),
            None => Ok(match &*self.fallback.read() {
                Fallback::Fixed(response) => response.clone(),
                Fallback::Handler(handler) => handler(&ctx),
            }),
        };

        let outcome = match result {
            Ok(response) => {
                self.log.append(
                    request,
                    group_position,
                    CallOutcome::Responded {
                        status: response.status,
                    },
                );
                DispatchOutcome::Response(response)
            }
            Err(failure) => {
                self.log.append(
                    request,
                    group_position,
                    CallOutcome::TransportFailure { kind: failure.kind },
                );
                DispatchOutcome::TransportFailure(failure)
            }
        };

        (outcome, delay)
    }
}
