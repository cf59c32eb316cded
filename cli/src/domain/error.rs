//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator, so callers can still `downcast_ref` them.

use microsaas_common::{InstanceState, PortKind, SubscriptionState};
use thiserror::Error;

/// Maximum number of stderr bytes kept for display in errors and logs.
pub const STDERR_DISPLAY_LIMIT: usize = 1000;

// ── Validation errors ─────────────────────────────────────────────────────────

/// Guard failures on create/renew requests. Raised before any state changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Only customer sales documents can be used (got '{0}').")]
    NotCustomerInvoice(String),

    #[error("Document {0} must be fully paid.")]
    NotPaid(String),

    #[error("Document {0} has no customer assigned.")]
    NoCustomer(String),

    #[error("Document {0} has no subscription plan line.")]
    NoPlanLine(String),

    #[error("Document {document} has {count} subscription plan lines; exactly one is allowed.")]
    MultiplePlanLines { document: String, count: usize },

    #[error("Plan '{0}' has no duration configured.")]
    PlanWithoutDuration(String),

    #[error("Document {0} was already used to renew a subscription.")]
    AlreadyUsedForRenewal(String),

    #[error("Document {document} already created subscription {reference}.")]
    AlreadyConverted { document: String, reference: String },

    #[error("Instance '{instance}' already belongs to subscription {reference}.")]
    InstanceAlreadyBound { instance: String, reference: String },

    #[error("No renewable subscription for plan '{plan}' of customer '{customer}'. Create a subscription instead.")]
    NoRenewableSubscription { customer: String, plan: String },

    #[error("Instance name must not be empty.")]
    EmptyName,

    #[error("HTTP and longpolling ports must differ (both {0}).")]
    SamePorts(u16),

    #[error("Invalid repository line '{0}': expected URL@BRANCH")]
    InvalidRepository(String),
}

// ── Port errors ───────────────────────────────────────────────────────────────

/// Errors raised by port allocation, pre-flight checks, and the ledger.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error(
        "No ports available in range {start}-{end}. \
Release ports with 'microsaas port release' or widen the range with 'microsaas config set ports.range_end <port>'."
    )]
    NoPortAvailable { start: u16, end: u16 },

    #[error(
        "The {label} port ({port}) is already in use by another process. \
It may be held by the host application, another container, or an unrelated program. \
Assign a different port or stop the process using it."
    )]
    PortInUse { label: &'static str, port: u16 },

    #[error("Port {port} ({kind}) is already reserved by instance '{owner}'.")]
    AlreadyReserved {
        port: u16,
        kind: PortKind,
        owner: String,
    },

    #[error("No reservation recorded for port {port} ({kind}).")]
    NotReserved { port: u16, kind: PortKind },

    #[error("Invalid port range {start}-{end}.")]
    InvalidRange { start: u16, end: u16 },
}

// ── Instance errors ───────────────────────────────────────────────────────────

/// Errors related to instance lifecycle and identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("Instance '{0}' not found.")]
    NotFound(String),

    #[error("Instance '{0}' already exists.")]
    AlreadyExists(String),

    #[error("Instance '{name}' is {state}; '{action}' requires it to be running.")]
    NotRunning {
        name: String,
        state: InstanceState,
        action: &'static str,
    },

    #[error("Template '{0}' not found.")]
    TemplateNotFound(String),

    #[error("{action} failed (exit code {code}): {stderr}")]
    ExternalProcess {
        action: String,
        code: String,
        stderr: String,
    },
}

impl InstanceError {
    /// Build an `ExternalProcess` error, truncating stderr to the display limit.
    #[must_use]
    pub fn external(action: impl Into<String>, code: Option<i32>, stderr: &str) -> Self {
        Self::ExternalProcess {
            action: action.into(),
            code: code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr: truncate_for_display(stderr, STDERR_DISPLAY_LIMIT),
        }
    }
}

/// An external process exceeded its time bound and was killed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{program} timed out after {secs}s")]
pub struct ProcessTimeout {
    pub program: String,
    pub secs: u64,
}

// ── Subscription errors ───────────────────────────────────────────────────────

/// Errors related to the subscription state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Subscription '{0}' not found.")]
    NotFound(String),

    #[error("Plan '{plan}' has no duration configured; cannot compute an end date.")]
    NoDurationConfigured { plan: String },

    #[error("Cannot {action} subscription in state '{from}'.")]
    InvalidTransition {
        from: SubscriptionState,
        action: &'static str,
    },
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nExpected: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },
}

/// Truncate `text` to at most `limit` bytes on a char boundary.
#[must_use]
pub fn truncate_for_display(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= limit {
        return trimmed.to_string();
    }
    let mut end = limit;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}
