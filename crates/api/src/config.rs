//! Application configuration loaded from environment variables.

use saga::SagaConfig;

use crate::routes::orders::DEFAULT_RETAINED_RUNS;

/// Server configuration.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `RETAINED_RUNS` — runs kept before finished ones are pruned (default: `1000`)
///
/// Saga timings come from [`SagaConfig::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub retained_runs: usize,
    pub saga: SagaConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            retained_runs: std::env::var("RETAINED_RUNS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(DEFAULT_RETAINED_RUNS),
            saga: SagaConfig::from_env(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            retained_runs: DEFAULT_RETAINED_RUNS,
            saga: SagaConfig::default(),
        }
    }
}
