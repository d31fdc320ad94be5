//! Harness configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::ProbeConfig;

fn default_base_url() -> String {
    "http://localhost:7071".to_string()
}

fn default_trigger_path() -> String {
    "/api/workflow/trigger".to_string()
}

fn default_run_timeout_ms() -> u64 {
    300_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Configuration for one test runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessConfig {
    /// Base URL of the local workflow emulator.
    #[serde(default = "default_base_url")]
    pub emulator_base_url: String,
    /// Path of the workflow trigger endpoint, relative to the base URL.
    #[serde(default = "default_trigger_path")]
    pub trigger_path: String,
    /// How long to wait for the run to reach a terminal state.
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,
    /// Interval between run-status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Storage-emulator liveness probe settings.
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            emulator_base_url: default_base_url(),
            trigger_path: default_trigger_path(),
            run_timeout_ms: default_run_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            probe: ProbeConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: HarnessConfig = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(config.emulator_base_url, "http://localhost:7071");
        assert_eq!(config.run_timeout(), Duration::from_millis(300_000));
        assert_eq!(config.probe.ports, vec![10000, 10001, 10002]);
    }

    #[test]
    fn overrides_are_honored() {
        let config: HarnessConfig = serde_json::from_str(
            r#"{"emulatorBaseUrl": "http://localhost:9999", "runTimeoutMs": 1000}"#,
        )
        .unwrap();
        assert_eq!(config.emulator_base_url, "http://localhost:9999");
        assert_eq!(config.run_timeout(), Duration::from_millis(1000));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }
}
