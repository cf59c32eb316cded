//! MicroSaaS library: the lifecycle engine behind the `microsaas` binary,
//! exposed for integration testing and embedding callers.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod app;
pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod infra;
pub mod output;
