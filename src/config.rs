use std::time::Duration;

use serde::Deserialize;

use crate::services::device::DEFAULT_TELEMETRY_PERIOD;

/// How the binary presents itself
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Interactive terminal menu on stdin/stdout
    Console,
    /// HTTP API server
    Server,
}

/// Application configuration loaded from `MARQUEE_*` environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Console or HTTP server
    #[serde(default = "default_mode")]
    pub mode: RunMode,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the JSON user/ratings file
    #[serde(default = "default_users_file")]
    pub users_file: String,

    /// Hard deadline for a single backend call, in milliseconds
    #[serde(default = "default_backend_deadline_ms")]
    pub backend_deadline_ms: u64,

    /// Period of the telemetry loop, in milliseconds
    #[serde(default = "default_telemetry_period_ms")]
    pub telemetry_period_ms: u64,

    /// Number of ratings at which the secondary backend is preferred
    #[serde(default = "default_secondary_threshold")]
    pub secondary_threshold: usize,

    /// Number of recommendations requested per action
    #[serde(default = "default_recommendation_count")]
    pub recommendation_count: usize,

    /// When false the session runs without any backend and always serves the fallback
    #[serde(default = "default_backends_enabled")]
    pub backends_enabled: bool,

    #[serde(default = "default_voice_hold_ms")]
    pub voice_hold_ms: u64,

    #[serde(default = "default_tilt_hold_ms")]
    pub tilt_hold_ms: u64,

    #[serde(default = "default_button_hold_ms")]
    pub button_hold_ms: u64,

    /// Default tracing filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_mode() -> RunMode {
    RunMode::Console
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_users_file() -> String {
    "users.json".to_string()
}

fn default_backend_deadline_ms() -> u64 {
    8_000
}

fn default_telemetry_period_ms() -> u64 {
    DEFAULT_TELEMETRY_PERIOD.as_millis() as u64
}

fn default_secondary_threshold() -> usize {
    3
}

fn default_recommendation_count() -> usize {
    3
}

fn default_backends_enabled() -> bool {
    true
}

fn default_voice_hold_ms() -> u64 {
    1_000
}

fn default_tilt_hold_ms() -> u64 {
    1_000
}

fn default_button_hold_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            host: default_host(),
            port: default_port(),
            users_file: default_users_file(),
            backend_deadline_ms: default_backend_deadline_ms(),
            telemetry_period_ms: default_telemetry_period_ms(),
            secondary_threshold: default_secondary_threshold(),
            recommendation_count: default_recommendation_count(),
            backends_enabled: default_backends_enabled(),
            voice_hold_ms: default_voice_hold_ms(),
            tilt_hold_ms: default_tilt_hold_ms(),
            button_hold_ms: default_button_hold_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed("MARQUEE_")
            .from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.backend_deadline_ms == 0 {
            anyhow::bail!("MARQUEE_BACKEND_DEADLINE_MS must be positive");
        }
        if self.telemetry_period_ms == 0 {
            anyhow::bail!("MARQUEE_TELEMETRY_PERIOD_MS must be positive");
        }
        if self.recommendation_count == 0 {
            anyhow::bail!("MARQUEE_RECOMMENDATION_COUNT must be positive");
        }
        Ok(())
    }

    pub fn backend_deadline(&self) -> Duration {
        Duration::from_millis(self.backend_deadline_ms)
    }

    pub fn telemetry_period(&self) -> Duration {
        Duration::from_millis(self.telemetry_period_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert_eq!(config.mode, RunMode::Console);
        assert_eq!(config.backend_deadline(), Duration::from_secs(8));
        assert_eq!(config.telemetry_period(), DEFAULT_TELEMETRY_PERIOD);
        assert_eq!(config.secondary_threshold, 3);
        assert_eq!(config.recommendation_count, 3);
        assert!(config.backends_enabled);
    }

    #[test]
    fn test_overrides_from_prefixed_vars() {
        let config = Config::from_vars(vars(&[
            ("MARQUEE_MODE", "server"),
            ("MARQUEE_PORT", "8080"),
            ("MARQUEE_BACKEND_DEADLINE_MS", "250"),
            ("MARQUEE_SECONDARY_THRESHOLD", "5"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.mode, RunMode::Server);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.backend_deadline(), Duration::from_millis(250));
        assert_eq!(config.secondary_threshold, 5);
    }

    #[test]
    fn test_zero_deadline_is_rejected() {
        let result = Config::from_vars(vars(&[("MARQUEE_BACKEND_DEADLINE_MS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_matches_empty_environment() {
        let from_env = Config::from_vars(Vec::new()).unwrap();
        let default = Config::default();
        assert_eq!(from_env.port, default.port);
        assert_eq!(from_env.users_file, default.users_file);
        assert_eq!(from_env.button_hold_ms, default.button_hold_ms);
    }
}
