//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use messaging::RetryPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `STEP_TIMEOUT_MS`: time limit per store call (default: `5000`)
/// - `BUS_CAPACITY`: events buffered per bus subscriber (default: `1024`)
/// - `RETRY_MAX_ATTEMPTS`: listener attempts per event (default: `3`)
/// - `RETRY_BASE_DELAY_MS`: first retry delay (default: `100`)
/// - `RETRY_MAX_DELAY_MS`: retry delay cap (default: `5000`)
///
/// Unset or unparsable values fall back to the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub step_timeout: Duration,
    pub bus_capacity: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn millis_or(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .map_or(default, Duration::from_millis)
}

impl AppConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            step_timeout: millis_or("STEP_TIMEOUT_MS", defaults.step_timeout),
            bus_capacity: env_or("BUS_CAPACITY", defaults.bus_capacity),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_base_delay: millis_or("RETRY_BASE_DELAY_MS", defaults.retry_base_delay),
            retry_max_delay: millis_or("RETRY_MAX_DELAY_MS", defaults.retry_max_delay),
        }
    }

    /// The retry policy for bus listeners.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts.max(1),
            self.retry_base_delay,
            self.retry_max_delay.max(self.retry_base_delay),
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            step_timeout: billing::pay_bill::DEFAULT_STEP_TIMEOUT,
            bus_capacity: 1024,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const KEYS: [&str; 7] = [
        "RUST_LOG",
        "LOG_FORMAT",
        "STEP_TIMEOUT_MS",
        "BUS_CAPACITY",
        "RETRY_MAX_ATTEMPTS",
        "RETRY_BASE_DELAY_MS",
        "RETRY_MAX_DELAY_MS",
    ];

    fn clear_env() {
        for key in KEYS {
            // SAFETY: env-mutating tests are serialized.
            unsafe { std::env::remove_var(key) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env-mutating tests are serialized.
        unsafe { std::env::set_var(key, value) };
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.step_timeout, Duration::from_secs(5));
        assert_eq!(config.bus_capacity, 1024);
        assert_eq!(config.retry_max_attempts, 3);
    }

    #[test]
    #[serial]
    fn test_from_env_without_variables_uses_defaults() {
        clear_env();
        assert_eq!(AppConfig::from_env(), AppConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        clear_env();
        set_env("RUST_LOG", "debug,saga=trace");
        set_env("LOG_FORMAT", "JSON");
        set_env("STEP_TIMEOUT_MS", "250");
        set_env("BUS_CAPACITY", "64");
        set_env("RETRY_MAX_ATTEMPTS", "5");
        set_env("RETRY_BASE_DELAY_MS", "10");
        set_env("RETRY_MAX_DELAY_MS", "80");

        let config = AppConfig::from_env();
        clear_env();

        assert_eq!(config.log_level, "debug,saga=trace");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.step_timeout, Duration::from_millis(250));
        assert_eq!(config.bus_capacity, 64);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(80));
    }

    #[test]
    #[serial]
    fn test_unparsable_values_fall_back() {
        clear_env();
        set_env("STEP_TIMEOUT_MS", "soon");
        set_env("LOG_FORMAT", "xml");
        set_env("BUS_CAPACITY", "-1");

        let config = AppConfig::from_env();
        clear_env();

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_retry_policy_is_sane_for_odd_values() {
        let config = AppConfig {
            retry_max_attempts: 0,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_millis(100),
            ..AppConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_delay, Duration::from_millis(500));
    }
}
