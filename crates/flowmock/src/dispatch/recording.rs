//! Append-only log of intercepted calls.
//!
//! One entry per call in true arrival order. Entries are never mutated after
//! append; tests read a snapshot for assertions and computed bodies read the
//! prior entries to build streaming-style responses.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::dispatch::plan::FailureKind;
use crate::dispatch::predicate::MockRequest;

/// How an intercepted call was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Responded { status: u16 },
    TransportFailure { kind: FailureKind },
}

/// Snapshot of one intercepted outbound call and its resolution.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// 0-based arrival index across all intercepted calls.
    pub index: u64,
    pub method: String,
    pub uri: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// 1-based counter value within the matched predicate group, when one
    /// matched.
    pub group_position: Option<u64>,
    pub outcome: CallOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl RecordedCall {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Arrival-ordered call log. Append order defines arrival order under
/// concurrency.
#[derive(Default)]
pub(crate) struct CallLog {
    entries: Mutex<Vec<RecordedCall>>,
}

impl CallLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(
        &self,
        request: &MockRequest,
        group_position: Option<u64>,
        outcome: CallOutcome,
    ) -> RecordedCall {
        let mut entries = self.entries.lock();
        let call = RecordedCall {
            index: entries.len() as u64,
            method: request.method.clone(),
            uri: request.uri.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            group_position,
            outcome,
            recorded_at: Utc::now(),
        };
        entries.push(call.clone());
        call
    }

    pub(crate) fn snapshot(&self) -> Vec<RecordedCall> {
        self.entries.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_arrival_indices() {
        let log = CallLog::new();
        let request = MockRequest::new("GET", "/a");
        let first = log.append(&request, Some(1), CallOutcome::Responded { status: 200 });
        let second = log.append(&request, Some(2), CallOutcome::Responded { status: 200 });
        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let log = CallLog::new();
        let request = MockRequest::new("GET", "/a");
        log.append(&request, None, CallOutcome::Responded { status: 200 });
        let snapshot = log.snapshot();
        log.append(&request, None, CallOutcome::Responded { status: 200 });
        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }
}
