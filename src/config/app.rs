//! Main application configuration
//!
//! This module defines the primary configuration structures for the lineup
//! matchmaking service, including file and environment loading and validation.

use crate::error::MatchmakingError;
use crate::matching::grouping::{GroupingConfig, ReservationPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingSettings,
    pub notifications: NotificationSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host the HTTP server binds to
    pub http_host: String,
    /// Port for ingress, subscriber sockets, health and metrics (0 picks a free port)
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matching engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Interval between matching passes in milliseconds
    pub tick_interval_ms: u64,
    /// Maximum number of queued players read per pass
    pub candidate_limit: usize,
    /// Players per match
    pub group_size: usize,
    /// Starting rating tolerance around a seed
    pub initial_band: f64,
    /// Multiplier applied to the band after each widening pass
    pub band_growth: f64,
    /// Number of scan passes per seed
    pub max_widenings: u32,
    /// Whether failed seed attempts release their recruits
    pub reservation_policy: ReservationPolicy,
}

/// Notification hub settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Capacity of the hub's command inbox
    pub inbox_capacity: usize,
    /// Per-subscriber outbound buffer
    pub subscriber_buffer: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "lineup".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 5,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        let grouping = GroupingConfig::default();
        Self {
            tick_interval_ms: 500,
            candidate_limit: 50,
            group_size: grouping.group_size,
            initial_band: grouping.initial_band,
            band_growth: grouping.band_growth,
            max_widenings: grouping.max_widenings,
            reservation_policy: grouping.reservation_policy,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            inbox_capacity: 64,
            subscriber_buffer: 32,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            self.service.http_host = host;
        }
        if let Some(port) = parse_env("HTTP_PORT")? {
            self.service.http_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }

        // Matchmaking settings
        if let Some(tick) = parse_env("TICK_INTERVAL_MS")? {
            self.matchmaking.tick_interval_ms = tick;
        }
        if let Some(limit) = parse_env("CANDIDATE_LIMIT")? {
            self.matchmaking.candidate_limit = limit;
        }
        if let Some(size) = parse_env("GROUP_SIZE")? {
            self.matchmaking.group_size = size;
        }
        if let Some(band) = parse_env("INITIAL_BAND")? {
            self.matchmaking.initial_band = band;
        }
        if let Some(growth) = parse_env("BAND_GROWTH")? {
            self.matchmaking.band_growth = growth;
        }
        if let Some(widenings) = parse_env("MAX_WIDENINGS")? {
            self.matchmaking.max_widenings = widenings;
        }
        if let Some(policy) = parse_env("RESERVATION_POLICY")? {
            self.matchmaking.reservation_policy = policy;
        }

        // Notification settings
        if let Some(capacity) = parse_env("NOTIFICATION_INBOX_CAPACITY")? {
            self.notifications.inbox_capacity = capacity;
        }
        if let Some(buffer) = parse_env("SUBSCRIBER_BUFFER")? {
            self.notifications.subscriber_buffer = buffer;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get matching tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking.tick_interval_ms)
    }

    /// Grouping parameters for the matching engine
    pub fn grouping(&self) -> GroupingConfig {
        GroupingConfig {
            group_size: self.matchmaking.group_size,
            initial_band: self.matchmaking.initial_band,
            band_growth: self.matchmaking.band_growth,
            max_widenings: self.matchmaking.max_widenings,
            reservation_policy: self.matchmaking.reservation_policy,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| invalid(format!("Invalid {} value: {}", key, value))),
        Err(_) => Ok(None),
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    MatchmakingError::ConfigurationError {
        message: message.into(),
    }
    .into()
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => {
            return Err(invalid(format!(
                "Invalid log level: {}",
                config.service.log_level
            )))
        }
    }

    // Validate service settings; port 0 binds an ephemeral port
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(invalid("Shutdown timeout must be greater than 0"));
    }

    // Validate matchmaking settings
    let matchmaking = &config.matchmaking;
    if matchmaking.tick_interval_ms == 0 {
        return Err(invalid("Tick interval must be greater than 0"));
    }
    if matchmaking.group_size < 2 {
        return Err(invalid("Group size must be at least 2"));
    }
    if matchmaking.candidate_limit < matchmaking.group_size {
        return Err(invalid(format!(
            "Candidate limit ({}) cannot be smaller than group size ({})",
            matchmaking.candidate_limit,
            matchmaking.group_size
        )));
    }
    if !(matchmaking.initial_band.is_finite() && matchmaking.initial_band > 0.0) {
        return Err(invalid("Initial band must be positive"));
    }
    if !(matchmaking.band_growth.is_finite() && matchmaking.band_growth >= 1.0) {
        return Err(invalid("Band growth must be at least 1.0"));
    }
    if matchmaking.max_widenings == 0 {
        return Err(invalid("Max widenings must be greater than 0"));
    }

    // Validate notification settings
    if config.notifications.inbox_capacity == 0 {
        return Err(invalid(
            "Notification inbox capacity must be greater than 0",
        ));
    }
    if config.notifications.subscriber_buffer == 0 {
        return Err(invalid("Subscriber buffer must be greater than 0"));
    }

    Ok(())
}
