//! Application services: use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod billing_intake;
pub mod config_service;
pub mod expiry_sweep;
pub mod instance_supervisor;
pub mod port_allocator;
pub mod queries;
pub mod subscription;
pub mod templates;
