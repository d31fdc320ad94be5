//! Boundary with the workflow runtime.
//!
//! The emulator hosting the workflow is a black box behind
//! [`WorkflowRuntime`]: it accepts a trigger invocation, reports run status,
//! and hands back the run-history document once the run is terminal.
//! [`HttpEmulatorClient`] is the HTTP implementation against a local
//! emulator's management API; tests substitute scripted implementations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::error::RuntimeError;
use crate::trace::history::{RunHistory, RunStatus};

/// Header the emulator uses to report the identifier of the run a trigger
/// invocation started.
pub const RUN_ID_HEADER: &str = "x-flow-run-id";

/// Trigger invocation payload.
#[derive(Debug, Clone, Default)]
pub struct TriggerRequest {
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl TriggerRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// HTTP-shaped response of the trigger invocation, plus the identifier of
/// the run it started.
#[derive(Debug, Clone)]
pub struct TriggerResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub run_id: String,
}

impl TriggerResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The workflow runtime as the harness sees it.
#[async_trait]
pub trait WorkflowRuntime: Send + Sync {
    /// Invoke the workflow trigger endpoint; blocks until the trigger's own
    /// HTTP response is available (not until the run completes).
    async fn trigger(&self, request: TriggerRequest) -> Result<TriggerResponse, RuntimeError>;

    /// Current status of a run.
    async fn run_status(&self, run_id: &str) -> Result<RunStatus, RuntimeError>;

    /// Full run-history document. Only meaningful once the run is terminal,
    /// but callable earlier for partial diagnostics.
    async fn run_history(&self, run_id: &str) -> Result<RunHistory, RuntimeError>;
}

#[derive(Debug, Deserialize)]
struct RunStatusDoc {
    status: RunStatus,
}

/// [`WorkflowRuntime`] over the local emulator's HTTP management API.
pub struct HttpEmulatorClient {
    base_url: String,
    trigger_path: String,
    client: reqwest::Client,
}

impl HttpEmulatorClient {
    pub fn new(base_url: impl Into<String>, trigger_path: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");
        Self {
            base_url: base_url.into(),
            trigger_path: trigger_path.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl WorkflowRuntime for HttpEmulatorClient {
    async fn trigger(&self, request: TriggerRequest) -> Result<TriggerResponse, RuntimeError> {
        let mut builder = self.client.post(self.url(&self.trigger_path));
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let run_id = headers
            .get(RUN_ID_HEADER)
            .cloned()
            .ok_or(RuntimeError::MissingRunId)?;
        let body = response.bytes().await?;

        Ok(TriggerResponse {
            status,
            headers,
            body,
            run_id,
        })
    }

    async fn run_status(&self, run_id: &str) -> Result<RunStatus, RuntimeError> {
        let response = self
            .client
            .get(self.url(&format!("/runtime/runs/{run_id}/status")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RuntimeError::Emulator {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let doc: RunStatusDoc = serde_json::from_slice(&response.bytes().await?)?;
        Ok(doc.status)
    }

    async fn run_history(&self, run_id: &str) -> Result<RunHistory, RuntimeError> {
        let response = self
            .client
            .get(self.url(&format!("/runtime/runs/{run_id}")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RuntimeError::Emulator {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let history: RunHistory = serde_json::from_slice(&response.bytes().await?)?;
        Ok(history)
    }
}
