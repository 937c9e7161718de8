//! Timeout configuration for client operations.
//!
//! Connect attempts and health probes are the only bounded operations;
//! subscribing and decoding are fire-and-forget, since the absence of a
//! message is not an error.

use std::time::Duration;

/// Timeout configuration for pulse-link client operations.
///
/// # Examples
///
/// ```rust
/// use pulse_link::PulseLinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults (recommended for most cases)
/// let timeouts = PulseLinkTimeouts::default();
///
/// // Custom values for high-latency environments
/// let timeouts = PulseLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .health_check_timeout(Duration::from_secs(15))
///     .build();
///
/// // Aggressive values for local development
/// let timeouts = PulseLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct PulseLinkTimeouts {
    /// Timeout for establishing a broker session (TCP + handshake).
    /// Default: 10 seconds.
    pub connection_timeout: Duration,

    /// Bound on the health-check probe: the probe fails if a live session is
    /// not observed within this window. Default: 5 seconds.
    pub health_check_timeout: Duration,

    /// Keepalive ping interval on the shared session.
    /// Set to 0 to disable keepalive pings. Default: 10 seconds.
    pub keepalive_interval: Duration,

    /// Maximum wait for any frame after a keepalive ping before the session
    /// is treated as dead. Set to 0 to disable. Default: 5 seconds.
    pub pong_timeout: Duration,
}

impl Default for PulseLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            health_check_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(5),
        }
    }
}

impl PulseLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> PulseLinkTimeoutsBuilder {
        PulseLinkTimeoutsBuilder::new()
    }

    /// Timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            health_check_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(5),
            pong_timeout: Duration::from_secs(2),
        }
    }

    /// Timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`PulseLinkTimeouts`].
#[derive(Debug, Clone)]
pub struct PulseLinkTimeoutsBuilder {
    timeouts: PulseLinkTimeouts,
}

impl PulseLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: PulseLinkTimeouts::default(),
        }
    }

    /// Set the session establishment timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the session establishment timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the health-check probe bound.
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.health_check_timeout = timeout;
        self
    }

    /// Set the health-check probe bound in seconds.
    pub fn health_check_timeout_secs(self, secs: u64) -> Self {
        self.health_check_timeout(Duration::from_secs(secs))
    }

    /// Set the keepalive ping interval. Zero disables keepalive.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Set the keepalive ping interval in seconds. Zero disables keepalive.
    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Set the pong deadline after a keepalive ping. Zero disables the check.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pong_timeout = timeout;
        self
    }

    /// Set the pong deadline in seconds. Zero disables the check.
    pub fn pong_timeout_secs(self, secs: u64) -> Self {
        self.pong_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> PulseLinkTimeouts {
        self.timeouts
    }
}
