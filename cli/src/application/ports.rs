//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use microsaas_common::InstanceState;

use crate::domain::config::HostConfig;
use crate::domain::platform::PlatformState;

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned) and
    /// the error must downcast to `ProcessTimeout`.
    async fn run_with_timeout(&self, program: &str, args: &[&str], timeout: Duration)
    -> Result<Output>;
}

// ── Container Runtime Port ────────────────────────────────────────────────────

/// How much `down` removes besides the containers themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Graceful shutdown of the declared services.
    Stop,
    /// Also remove containers no longer declared in the compose file.
    RemoveOrphans,
    /// Remove orphans and anonymous volumes.
    Purge,
}

/// The container-orchestration CLI, addressed by compose file path.
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Fetch the images declared in `compose_file`.
    async fn pull(&self, compose_file: &Path, timeout: Duration) -> Result<Output>;
    /// Bring the service set up, detached.
    async fn up(&self, compose_file: &Path, timeout: Duration) -> Result<Output>;
    async fn down(&self, compose_file: &Path, mode: Teardown, timeout: Duration)
    -> Result<Output>;
    async fn restart(&self, compose_file: &Path, timeout: Duration) -> Result<Output>;
}

// ── Source Control Port ───────────────────────────────────────────────────────

#[allow(async_fn_in_trait)]
pub trait SourceControl {
    /// Clone one branch of `url` into `dest`.
    async fn clone_branch(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Network Probe Port ────────────────────────────────────────────────────────

/// Operating-system view of a TCP port.
#[allow(async_fn_in_trait)]
pub trait PortProbe {
    /// Bind then immediately release `port` on all interfaces. `true` when
    /// the bind succeeded.
    async fn is_free(&self, port: u16) -> bool;
}

// ── Filesystem Port ───────────────────────────────────────────────────────────

/// Instance directory tree operations. Sync: every call is a short local
/// filesystem operation.
pub trait InstanceFs {
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Remove `path` recursively. A missing path is not an error.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

// ── State and Config Ports ────────────────────────────────────────────────────

/// Abstracts platform state persistence (load/save).
///
/// Every load-modify-save cycle runs while holding `lock()`, so writers in
/// other processes cannot interleave and drop each other's records.
#[allow(async_fn_in_trait)]
pub trait PlatformStateStore {
    /// Exclusive hold on the stored state, released when dropped.
    type Lock;
    /// Wait until no other holder (in any process) has the state locked.
    /// Not reentrant: a task must not call this while holding a lock.
    async fn lock(&self) -> Result<Self::Lock>;
    /// Load the current state. A missing state file yields an empty state.
    async fn load_async(&self) -> Result<PlatformState>;
    /// Persist the given state.
    async fn save_async(&self, state: &PlatformState) -> Result<()>;
}

/// Abstracts host configuration storage.
pub trait ConfigStore {
    /// Load configuration, returning defaults if the file does not exist.
    fn load(&self) -> Result<HostConfig>;
    /// Persist configuration.
    fn save(&self, config: &HostConfig) -> Result<()>;
    /// Path of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}

// ── Clock Port ────────────────────────────────────────────────────────────────

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    /// The calendar date subscription rules compare against.
    fn today(&self) -> NaiveDate;
}

// ── Instance Control Port ─────────────────────────────────────────────────────

/// The boundary through which subscription transitions drive instances.
///
/// Implemented by the instance supervisor; subscription code never writes
/// instance state directly.
#[allow(async_fn_in_trait)]
pub trait InstanceControl {
    /// Current state, or `None` when the instance no longer exists.
    async fn instance_state(&self, name: &str) -> Result<Option<InstanceState>>;
    /// Start the instance and return the state it settled in.
    async fn start_instance(&self, name: &str) -> Result<InstanceState>;
    /// Stop the instance and return the state it settled in.
    async fn stop_instance(&self, name: &str) -> Result<InstanceState>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
