//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod app_conf;
pub mod billing;
pub mod config;
pub mod error;
pub mod instance;
pub mod instance_log;
pub mod platform;
pub mod port_ledger;
pub mod subscription;
pub mod template;

pub use config::{HostConfig, apply_config_value, validate_config_key};
pub use error::{
    ConfigError, InstanceError, PortError, ProcessTimeout, SubscriptionError, ValidationError,
};
pub use instance::{Instance, RepositoryLine, sanitize_name};
pub use platform::PlatformState;
pub use port_ledger::{PortLedger, PortReservation};
pub use subscription::{Plan, RenewalRecord, Subscription};
