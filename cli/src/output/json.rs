//! JSON output helpers.
//!
//! Every `--json` code path prints one pretty-printed document on stdout.
//! Failures use the error object from [`format_error`].

use anyhow::{Context, Result};
use serde::Serialize;

/// Renders values as pretty-printed JSON on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn render<T: Serialize + ?Sized>(self, value: &T) -> Result<()> {
        let out = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
        println!("{out}");
        Ok(())
    }
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Stable error code for a failed command, derived from the typed error
/// at the root of the chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    use crate::domain::error::{
        ConfigError, InstanceError, PortError, SubscriptionError, ValidationError,
    };

    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PortError>() {
            return match e {
                PortError::PortInUse { .. } => "PORT_IN_USE",
                PortError::AlreadyReserved { .. } => "PORT_RESERVED",
                PortError::NoPortAvailable { .. } => "NO_PORT_AVAILABLE",
                PortError::NotReserved { .. } | PortError::InvalidRange { .. } => "PORT_ERROR",
            };
        }
        if let Some(e) = cause.downcast_ref::<InstanceError>() {
            return match e {
                InstanceError::NotFound(_) => "INSTANCE_NOT_FOUND",
                InstanceError::AlreadyExists(_) => "INSTANCE_EXISTS",
                _ => "INSTANCE_ERROR",
            };
        }
        if let Some(e) = cause.downcast_ref::<SubscriptionError>() {
            return match e {
                SubscriptionError::NotFound(_) => "SUBSCRIPTION_NOT_FOUND",
                _ => "SUBSCRIPTION_ERROR",
            };
        }
        if cause.downcast_ref::<ValidationError>().is_some() {
            return "VALIDATION_ERROR";
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return "CONFIG_ERROR";
        }
    }
    "ERROR"
}
