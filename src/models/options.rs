//! Connection-level behavior options.

use serde::{Deserialize, Serialize};

/// Options controlling reconnection behavior of the shared broker connection.
///
/// Separate from [`crate::PulseLinkTimeouts`], which bounds individual
/// operations; these options shape the lifetime of the connection itself.
///
/// # Example
///
/// ```rust
/// use pulse_link::ConnectionOptions;
///
/// let options = ConnectionOptions::new()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Reconnect automatically after a transport fault.
    /// Default: true.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay between reconnection attempts, in milliseconds.
    /// Doubles per attempt up to `max_reconnect_delay_ms`.
    /// Default: 1000.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Ceiling for the exponential reconnect backoff, in milliseconds.
    /// Default: 30000.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Give up after this many consecutive failed reconnection attempts.
    /// `None` retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30000,
            max_reconnect_attempts: None,
        }
    }
}

impl ConnectionOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable automatic reconnection.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the initial reconnect delay in milliseconds.
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the backoff ceiling in milliseconds.
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the attempt limit. `None` retries forever.
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Backoff delay for the given zero-based attempt number, in milliseconds.
    pub(crate) fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        std::cmp::min(
            self.reconnect_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
            self.max_reconnect_delay_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert!(options.auto_reconnect);
        assert_eq!(options.reconnect_delay_ms, 1000);
        assert_eq!(options.max_reconnect_delay_ms, 30000);
        assert_eq!(options.max_reconnect_attempts, None);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let options = ConnectionOptions::default();
        assert_eq!(options.backoff_delay_ms(0), 1000);
        assert_eq!(options.backoff_delay_ms(1), 2000);
        assert_eq!(options.backoff_delay_ms(3), 8000);
        assert_eq!(options.backoff_delay_ms(10), 30000);
        // No overflow panic at absurd attempt counts
        assert_eq!(options.backoff_delay_ms(u32::MAX), 30000);
    }

    #[test]
    fn test_serde_defaults() {
        let options: ConnectionOptions = serde_json::from_str("{}").unwrap();
        assert!(options.auto_reconnect);
        assert_eq!(options.reconnect_delay_ms, 1000);
    }
}
