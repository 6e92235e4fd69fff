//! Saga configuration loaded from environment variables.

use std::time::Duration;

use crate::compensation::CompensationMode;
use crate::order_fulfillment::DEFAULT_SHIPPING_ENDPOINT;
use crate::runtime::RetryPolicy;

/// Timing and collaborator settings of the order saga.
///
/// Reads from environment variables:
/// - `SAGA_PAUSE_UNIT_MS` — observation pause unit between milestones (default: `1000`)
/// - `SAGA_ADDRESS_WAIT_SECS` — bound of the address-correction window (default: `60`)
/// - `SAGA_TASK_LATENCY_MS` — simulated latency of external calls (default: `1000`)
/// - `SHIPPING_ENDPOINT` — endpoint of the shipping service (default: `"shipping-endpoint"`)
#[derive(Debug, Clone, PartialEq)]
pub struct SagaConfig {
    pub pause_unit: Duration,
    pub address_wait: Duration,
    pub task_latency: Duration,
    pub shipping_endpoint: String,
    pub retry_policy: RetryPolicy,
    pub compensation_policy: RetryPolicy,
    pub compensation_mode: CompensationMode,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pause_unit: env_millis("SAGA_PAUSE_UNIT_MS").unwrap_or(defaults.pause_unit),
            address_wait: std::env::var("SAGA_ADDRESS_WAIT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.address_wait),
            task_latency: env_millis("SAGA_TASK_LATENCY_MS").unwrap_or(defaults.task_latency),
            shipping_endpoint: std::env::var("SHIPPING_ENDPOINT")
                .unwrap_or(defaults.shipping_endpoint),
            ..defaults
        }
    }

    /// Configuration without observation pauses, for fast runs.
    pub fn without_pauses() -> Self {
        Self {
            pause_unit: Duration::ZERO,
            task_latency: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_compensation_mode(mut self, mode: CompensationMode) -> Self {
        self.compensation_mode = mode;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            pause_unit: Duration::from_secs(1),
            address_wait: Duration::from_secs(60),
            task_latency: Duration::from_secs(1),
            shipping_endpoint: DEFAULT_SHIPPING_ENDPOINT.to_string(),
            retry_policy: RetryPolicy::default(),
            compensation_policy: RetryPolicy::compensation(),
            compensation_mode: CompensationMode::Sequential,
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SagaConfig::default();
        assert_eq!(config.pause_unit, Duration::from_secs(1));
        assert_eq!(config.address_wait, Duration::from_secs(60));
        assert_eq!(config.shipping_endpoint, "shipping-endpoint");
        assert_eq!(config.compensation_mode, CompensationMode::Sequential);
    }

    #[test]
    fn test_without_pauses_keeps_address_bound() {
        let config = SagaConfig::without_pauses();
        assert_eq!(config.pause_unit, Duration::ZERO);
        assert_eq!(config.task_latency, Duration::ZERO);
        assert_eq!(config.address_wait, Duration::from_secs(60));
    }
}
