//! Transport Layer
//!
//! Framed TCP I/O plus the tunables shared by every link a machine owns.

use machine_config::SimulationSettings;
use std::time::Duration;

pub mod tcp;

pub use tcp::{FrameReader, FrameWriter, ReadOutcome};

/// Retry configuration for startup connection attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Total window during which attempts continue
    pub grace: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl RetryConfig {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, grace: Duration) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            grace,
            use_exponential_backoff: true,
        }
    }

    /// Calculate delay for given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if self.use_exponential_backoff {
            let delay = self
                .base_delay_ms
                .saturating_mul(2_u64.pow(attempt.min(10))); // Cap at 2^10
            delay.min(self.max_delay_ms)
        } else {
            self.base_delay_ms
        };
        Duration::from_millis(delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(100, 1_000, Duration::from_secs(10))
    }
}

/// Settings for a machine's transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub retry: RetryConfig,
    /// How long an accepted connection may take to identify itself
    pub handshake_timeout: Duration,
    /// Upper bound on waiting for read loops to finish during shutdown
    pub shutdown_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&SimulationSettings> for TransportConfig {
    fn from(settings: &SimulationSettings) -> Self {
        Self {
            retry: RetryConfig::new(
                settings.connect_base_delay_ms,
                settings.connect_max_delay_ms,
                settings.connect_grace(),
            ),
            shutdown_timeout: settings.shutdown_timeout(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config() {
        let config = RetryConfig::new(50, 400, Duration::from_secs(2));

        assert_eq!(config.calculate_delay(0), Duration::from_millis(50)); // 2^0 * 50
        assert_eq!(config.calculate_delay(1), Duration::from_millis(100)); // 2^1 * 50
        assert_eq!(config.calculate_delay(2), Duration::from_millis(200)); // 2^2 * 50
        assert_eq!(config.calculate_delay(5), Duration::from_millis(400)); // capped

        let no_backoff = RetryConfig {
            use_exponential_backoff: false,
            ..config
        };
        assert_eq!(no_backoff.calculate_delay(0), Duration::from_millis(50));
        assert_eq!(no_backoff.calculate_delay(5), Duration::from_millis(50)); // Same delay always
    }

    #[test]
    fn test_huge_base_delay_saturates() {
        let config = RetryConfig::new(u64::MAX / 2, u64::MAX, Duration::from_secs(1));

        assert_eq!(config.calculate_delay(0), Duration::from_millis(u64::MAX / 2));
        assert_eq!(config.calculate_delay(10), Duration::from_millis(u64::MAX));
        assert_eq!(config.calculate_delay(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SimulationSettings {
            connect_grace_ms: 3_000,
            connect_base_delay_ms: 20,
            connect_max_delay_ms: 200,
            shutdown_timeout_ms: 750,
            ..Default::default()
        };

        let config = TransportConfig::from(&settings);
        assert_eq!(config.retry.grace, Duration::from_secs(3));
        assert_eq!(config.retry.base_delay_ms, 20);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(750));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    }
}
