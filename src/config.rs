use crate::rate_limiter::LimiterConfig;
use clap::{Parser, ValueEnum};
use humantime_serde::re::humantime;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Service configuration, from command-line flags with environment fallbacks
#[derive(Debug, Clone, Parser)]
#[command(name = "reelvault", version, about = "Movie catalogue JSON API")]
pub struct Config {
    /// API server port
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Deployment environment
    #[arg(long = "env", env = "APP_ENV", value_enum, default_value_t = Environment::Development)]
    pub environment: Environment,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// PostgreSQL DSN; empty runs against an in-memory store
    #[arg(long, env = "DB_DSN", default_value = "", hide_env_values = true)]
    pub db_dsn: String,

    /// PostgreSQL max open connections
    #[arg(long, env = "DB_MAX_OPEN_CONNS", default_value_t = 25)]
    pub db_max_open_conns: u32,

    /// PostgreSQL connections kept open while idle
    #[arg(long, env = "DB_MAX_IDLE_CONNS", default_value_t = 25)]
    pub db_max_idle_conns: u32,

    /// PostgreSQL max connection idle time
    #[arg(long, env = "DB_MAX_IDLE_TIME", default_value = "15m", value_parser = humantime::parse_duration)]
    pub db_max_idle_time: Duration,

    /// Rate limiter maximum requests per second
    #[arg(long, env = "LIMITER_RPS", default_value_t = 2.0)]
    pub limiter_rps: f64,

    /// Rate limiter maximum burst
    #[arg(long, env = "LIMITER_BURST", default_value_t = 4)]
    pub limiter_burst: u32,

    /// Enable the rate limiter
    #[arg(long, env = "LIMITER_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub limiter_enabled: bool,
}

/// Connection settings for the PostgreSQL pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub max_idle_time: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            environment: Environment::Development,
            log_level: "info".to_string(),
            db_dsn: String::new(),
            db_max_open_conns: 25,
            db_max_idle_conns: 25,
            db_max_idle_time: Duration::from_secs(15 * 60),
            limiter_rps: 2.0,
            limiter_burst: 4,
            limiter_enabled: true,
        }
    }
}

impl Config {
    /// Parse flags and environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be greater than 0".to_string()));
        }
        if self.limiter_rps <= 0.0 || !self.limiter_rps.is_finite() {
            return Err(ConfigError::Invalid(
                "limiter rps must be a positive number".to_string(),
            ));
        }
        if self.limiter_burst == 0 {
            return Err(ConfigError::Invalid(
                "limiter burst must be greater than 0".to_string(),
            ));
        }
        if self.db_max_open_conns == 0 {
            return Err(ConfigError::Invalid(
                "db max open connections must be greater than 0".to_string(),
            ));
        }
        if self.db_max_idle_conns > self.db_max_open_conns {
            return Err(ConfigError::Invalid(
                "db max idle connections cannot exceed max open connections".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// `None` when no DSN is configured
    pub fn database(&self) -> Option<DatabaseConfig> {
        if self.db_dsn.trim().is_empty() {
            return None;
        }
        Some(DatabaseConfig {
            dsn: self.db_dsn.clone(),
            max_open_conns: self.db_max_open_conns,
            max_idle_conns: self.db_max_idle_conns,
            max_idle_time: self.db_max_idle_time,
        })
    }

    pub fn limiter(&self) -> LimiterConfig {
        LimiterConfig {
            rps: self.limiter_rps,
            burst: self.limiter_burst,
            enabled: self.limiter_enabled,
            ..LimiterConfig::default()
        }
    }
}
