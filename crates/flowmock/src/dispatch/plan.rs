//! Response synthesis for matched calls.
//!
//! A plan either produces an HTTP-shaped response (status, headers, body —
//! static or computed per call) or simulates a transport-level failure. A
//! failure plan never produces headers or a body; it is a different
//! control-flow channel than an HTTP error status. Delays are resolved to a
//! concrete duration at materialization time and suspend only the invoking
//! task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;

use crate::dispatch::predicate::MockRequest;
use crate::dispatch::recording::RecordedCall;
use crate::error::TransportError;

/// Synthesized response for one intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// The terminal default: 200 with no body.
    pub fn empty_ok() -> Self {
        Self::new(200)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Context handed to computed bodies and fallback handlers: the current
/// request plus everything recorded before it, so a plan can accumulate
/// bytes from prior calls and echo them back.
pub struct CallContext<'a> {
    pub request: &'a MockRequest,
    pub prior_calls: &'a [RecordedCall],
    /// 1-based counter value within the matched predicate group; `None` when
    /// no registered group matched the request.
    pub group_position: Option<u64>,
}

pub type BodyFn = Arc<dyn Fn(&CallContext<'_>) -> Bytes + Send + Sync>;

/// Where the response body comes from.
#[derive(Clone, Default)]
pub enum BodySource {
    #[default]
    None,
    Static(Bytes),
    /// Invoked at materialization time, once per matched call.
    Computed(BodyFn),
}

impl std::fmt::Debug for BodySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodySource::None => f.write_str("None"),
            BodySource::Static(bytes) => f.debug_tuple("Static").field(&bytes.len()).finish(),
            BodySource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Artificial latency applied before the response is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelaySpec {
    Fixed(Duration),
    /// Drawn uniformly from `[min, max]` at materialization time.
    Range { min: Duration, max: Duration },
}

impl DelaySpec {
    pub(crate) fn resolve(&self) -> Duration {
        match self {
            DelaySpec::Fixed(duration) => *duration,
            DelaySpec::Range { min, max } => {
                if max <= min {
                    return *min;
                }
                let span = (*max - *min).as_millis() as u64;
                let extra = rand::thread_rng().gen_range(0..=span);
                *min + Duration::from_millis(extra)
            }
        }
    }
}

/// Kind of simulated transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ConnectionReset,
    Timeout,
}

/// Simulated transport-level failure. Aborts response construction; the
/// caller of `intercept` sees it as if the network call itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSpec {
    pub kind: FailureKind,
    pub message: String,
}

/// How to answer a matched call.
#[derive(Debug, Clone, Default)]
pub struct ResponsePlan {
    status: u16,
    headers: HashMap<String, String>,
    body: BodySource,
    delay: Option<DelaySpec>,
    failure: Option<FailureSpec>,
}

impl ResponsePlan {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn ok() -> Self {
        Self::status(200)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = BodySource::Static(Bytes::from(body.into()));
        self
    }

    pub fn json_body(mut self, value: serde_json::Value) -> Self {
        self.body = BodySource::Static(Bytes::from(value.to_string()));
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self
    }

    pub fn bytes_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodySource::Static(body.into());
        self
    }

    pub fn computed_body(
        mut self,
        f: impl Fn(&CallContext<'_>) -> Bytes + Send + Sync + 'static,
    ) -> Self {
        self.body = BodySource::Computed(Arc::new(f));
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.delay = Some(DelaySpec::Fixed(duration));
        self
    }

    pub fn delay_between(mut self, min: Duration, max: Duration) -> Self {
        self.delay = Some(DelaySpec::Range { min, max });
        self
    }

    /// Replace the response with a simulated transport failure.
    pub fn fail(kind: FailureKind) -> Self {
        Self::fail_with(kind, "injected by response plan")
    }

    pub fn fail_with(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(FailureSpec {
                kind,
                message: message.into(),
            }),
            ..Self::default()
        }
    }

    pub(crate) fn delay_spec(&self) -> Option<&DelaySpec> {
        self.delay.as_ref()
    }

    /// Resolve the plan for one call. A failure spec wins over any configured
    /// status/headers/body.
    pub(crate) fn materialize(&self, ctx: &CallContext<'_>) -> Result<MockResponse, TransportError> {
        if let Some(failure) = &self.failure {
            return Err(TransportError {
                kind: failure.kind,
                message: failure.message.clone(),
            });
        }

        let status = if self.status == 0 { 200 } else { self.status };
        let body = match &self.body {
            BodySource::None => Bytes::new(),
            BodySource::Static(bytes) => bytes.clone(),
            BodySource::Computed(f) => f(ctx),
        };

        Ok(MockResponse {
            status,
            headers: self.headers.clone(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::predicate::MockRequest;

    fn ctx<'a>(request: &'a MockRequest, prior: &'a [RecordedCall]) -> CallContext<'a> {
        CallContext {
            request,
            prior_calls: prior,
            group_position: Some(1),
        }
    }

    #[test]
    fn default_status_is_200() {
        let request = MockRequest::new("GET", "/x");
        let response = ResponsePlan::default()
            .text_body("hi")
            .materialize(&ctx(&request, &[]))
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), "hi");
    }

    #[test]
    fn failure_plan_never_produces_a_body() {
        let request = MockRequest::new("GET", "/x");
        let err = ResponsePlan::fail(FailureKind::ConnectionReset)
            .materialize(&ctx(&request, &[]))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::ConnectionReset);
    }

    #[test]
    fn computed_body_sees_the_request() {
        let request = MockRequest::new("POST", "/echo").body("payload".as_bytes().to_vec());
        let response = ResponsePlan::ok()
            .computed_body(|ctx| ctx.request.body.clone())
            .materialize(&ctx(&request, &[]))
            .unwrap();
        assert_eq!(response.body_text(), "payload");
    }

    #[test]
    fn range_delay_stays_within_bounds() {
        let spec = DelaySpec::Range {
            min: Duration::from_millis(10),
            max: Duration::from_millis(20),
        };
        for _ in 0..50 {
            let d = spec.resolve();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
    }

    #[test]
    fn degenerate_range_resolves_to_min() {
        let spec = DelaySpec::Range {
            min: Duration::from_millis(30),
            max: Duration::from_millis(30),
        };
        assert_eq!(spec.resolve(), Duration::from_millis(30));
    }
}
