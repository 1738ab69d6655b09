//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: Postgres URL; unset keeps every store in memory
/// - `COMMAND_TIMEOUT_MS`: reply timeout for participant commands (default: `5000`)
/// - `CHANNEL_WORKERS`: worker slots per participant queue (default: `1`)
/// - `PAYMENT_DECLINE_RATE`: simulated gateway decline probability (default: `0.05`)
/// - `PAYMENT_GATEWAY_DELAY_MS`: simulated gateway latency (default: `100`)
/// - `RECOVER_ON_STARTUP`: compensate sagas left unfinished (default: `true`)
/// - `AMQP_URL`: RabbitMQ URL, honoured only with the `amqp` feature
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub command_timeout: Duration,
    pub channel_workers: usize,
    pub payment_decline_rate: f64,
    pub payment_gateway_delay: Duration,
    pub recover_on_startup: bool,
    pub amqp_url: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            database_url: env_opt("DATABASE_URL"),
            command_timeout: Duration::from_millis(env_or("COMMAND_TIMEOUT_MS", 5000)),
            channel_workers: env_or("CHANNEL_WORKERS", defaults.channel_workers).max(1),
            payment_decline_rate: env_or("PAYMENT_DECLINE_RATE", defaults.payment_decline_rate)
                .clamp(0.0, 1.0),
            payment_gateway_delay: Duration::from_millis(env_or("PAYMENT_GATEWAY_DELAY_MS", 100)),
            recover_on_startup: env_or("RECOVER_ON_STARTUP", defaults.recover_on_startup),
            amqp_url: env_opt("AMQP_URL"),
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
            log_format: LogFormat::Pretty,
            database_url: None,
            command_timeout: Duration::from_secs(5),
            channel_workers: 1,
            payment_decline_rate: 0.05,
            payment_gateway_delay: Duration::from_millis(100),
            recover_on_startup: true,
            amqp_url: None,
        }
    }
}
