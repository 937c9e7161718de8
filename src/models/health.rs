//! Health probe result types.

use serde::{Deserialize, Serialize};

/// Outcome class of a broker health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The broker accepted a probe connection within the timeout.
    Success,
    /// The probe failed or timed out.
    Error,
}

/// Result of an asynchronous broker health probe.
///
/// A failed probe is reported here, never as an `Err`: the failure is the
/// answer the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Probe outcome.
    pub status: HealthStatus,
    /// Human-readable detail.
    pub message: String,
}

impl HealthReport {
    /// Successful probe.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Success,
            message: message.into(),
        }
    }

    /// Failed probe.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
        }
    }

    /// Whether the probe succeeded.
    pub fn is_success(&self) -> bool {
        self.status == HealthStatus::Success
    }
}
