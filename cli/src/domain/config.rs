//! Domain types and validators for host configuration.
//!
//! Pure functions only. No I/O, no async, no filesystem access.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::instance_log::{DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES};
use crate::domain::subscription::DEFAULT_EXPIRING_WINDOW_DAYS;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "data_root",
    "base_url",
    "ports.range_start",
    "ports.range_end",
    "supervisor.preflight",
    "supervisor.pre_pull",
    "supervisor.compose_program",
    "supervisor.pull_timeout_secs",
    "supervisor.up_timeout_secs",
    "supervisor.teardown_timeout_secs",
    "supervisor.clone_timeout_secs",
    "supervisor.log_max_entries",
    "supervisor.log_max_bytes",
    "subscription.expiring_window_days",
];

/// Ports the host application itself listens on.
pub const DEFAULT_HOST_RESERVED: &[u16] = &[8069, 8071, 8072];

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.microsaas/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    /// Root directory for instance data. A leading `~` is expanded on load.
    pub data_root: String,
    /// Base URL used to derive instance URLs outside a codespace.
    pub base_url: String,
    pub ports: PortsConfig,
    pub supervisor: SupervisorConfig,
    pub subscription: SubscriptionConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            data_root: "~/odoo_docker/data".to_string(),
            base_url: "http://localhost:8069".to_string(),
            ports: PortsConfig::default(),
            supervisor: SupervisorConfig::default(),
            subscription: SubscriptionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortsConfig {
    pub range_start: u16,
    pub range_end: u16,
    pub host_reserved: Vec<u16>,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            range_start: 8073,
            range_end: 9999,
            host_reserved: DEFAULT_HOST_RESERVED.to_vec(),
        }
    }
}

/// Lifecycle policy knobs for the instance supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Bind-test both ports before touching the container runtime.
    pub preflight: bool,
    /// Fetch images ahead of `up` under their own timeout.
    pub pre_pull: bool,
    pub compose_program: String,
    pub pull_timeout_secs: u64,
    pub up_timeout_secs: u64,
    pub teardown_timeout_secs: u64,
    pub clone_timeout_secs: u64,
    pub log_max_entries: usize,
    pub log_max_bytes: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            preflight: true,
            pre_pull: true,
            compose_program: "docker-compose".to_string(),
            pull_timeout_secs: 900,
            up_timeout_secs: 300,
            teardown_timeout_secs: 60,
            clone_timeout_secs: 300,
            log_max_entries: DEFAULT_MAX_ENTRIES,
            log_max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub expiring_window_days: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            expiring_window_days: DEFAULT_EXPIRING_WINDOW_DAYS,
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

fn invalid(key: &str, value: &str, valid: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        valid: valid.to_string(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "true, false")),
    }
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(
    key: &str,
    value: &str,
) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .ok()
        .filter(|n| *n > T::default())
        .ok_or_else(|| invalid(key, value, "a positive integer"))
}

/// Validates and applies `value` to `key` on `config`.
///
/// # Errors
///
/// Returns an error if the key is unknown, the value does not parse, or the
/// resulting port range would be empty.
pub fn apply_config_value(config: &mut HostConfig, key: &str, value: &str) -> Result<()> {
    validate_config_key(key)?;
    match key {
        "data_root" if value.trim().is_empty() => {
            return Err(invalid(key, value, "a directory path").into());
        }
        "data_root" => config.data_root = value.to_string(),
        "base_url" if !value.contains("://") => {
            return Err(invalid(key, value, "a URL such as http://localhost:8069").into());
        }
        "base_url" => config.base_url = value.to_string(),
        "ports.range_start" => config.ports.range_start = parse_positive(key, value)?,
        "ports.range_end" => config.ports.range_end = parse_positive(key, value)?,
        "supervisor.preflight" => config.supervisor.preflight = parse_bool(key, value)?,
        "supervisor.pre_pull" => config.supervisor.pre_pull = parse_bool(key, value)?,
        "supervisor.compose_program" if value.trim().is_empty() => {
            return Err(invalid(key, value, "docker-compose, docker compose").into());
        }
        "supervisor.compose_program" => config.supervisor.compose_program = value.to_string(),
        "supervisor.pull_timeout_secs" => {
            config.supervisor.pull_timeout_secs = parse_positive(key, value)?;
        }
        "supervisor.up_timeout_secs" => {
            config.supervisor.up_timeout_secs = parse_positive(key, value)?;
        }
        "supervisor.teardown_timeout_secs" => {
            config.supervisor.teardown_timeout_secs = parse_positive(key, value)?;
        }
        "supervisor.clone_timeout_secs" => {
            config.supervisor.clone_timeout_secs = parse_positive(key, value)?;
        }
        "supervisor.log_max_entries" => {
            config.supervisor.log_max_entries = parse_positive(key, value)?;
        }
        "supervisor.log_max_bytes" => {
            config.supervisor.log_max_bytes = parse_positive(key, value)?;
        }
        "subscription.expiring_window_days" => {
            config.subscription.expiring_window_days = value
                .parse()
                .map_err(|_| invalid(key, value, "a non-negative integer"))?;
        }
        _ => anyhow::bail!("Unknown setting: {key}"),
    }
    if config.ports.range_start > config.ports.range_end {
        return Err(invalid(
            key,
            value,
            &format!(
                "ports.range_start <= ports.range_end (now {}-{})",
                config.ports.range_start, config.ports.range_end
            ),
        )
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
