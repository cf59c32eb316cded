//! Infrastructure implementation of the `PlatformStateStore` port.
//!
//! `JsonStateStore` provides async load/save using `tokio::task::spawn_blocking`
//! with atomic write (temp file + rename) to prevent state corruption.
//! Writers coordinate through an advisory lock on a sibling `.lock` file,
//! which every `microsaas` process sharing the state file honors.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::application::ports::PlatformStateStore;
use crate::domain::platform::PlatformState;

/// Environment variable overriding the state file location.
pub const STATE_ENV: &str = "MICROSAAS_STATE";

/// Exclusive advisory lock on the state file, released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %err, "could not release state lock");
        }
    }
}

/// State file store: implements `PlatformStateStore` for the infra layer.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Create a store at `$MICROSAAS_STATE`, or `~/.microsaas/state.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        if let Ok(val) = std::env::var(STATE_ENV) {
            return Ok(Self::with_path(PathBuf::from(val)));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_path(home.join(".microsaas").join("state.json")))
    }

    /// Create a store with an explicit path (used in tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    fn lock_sync(path: &Path) -> Result<StateLock> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("opening lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("locking {}", path.display()))?;
        Ok(StateLock { file })
    }

    fn load_sync(path: &Path) -> Result<PlatformState> {
        if !path.exists() {
            return Ok(PlatformState::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", path.display()))
    }

    fn save_sync(path: &Path, state: &PlatformState) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(state).context("serializing state")?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("finalizing state file {}", path.display()))?;
        Ok(())
    }
}

impl PlatformStateStore for JsonStateStore {
    type Lock = StateLock;

    async fn lock(&self) -> Result<StateLock> {
        let path = self.lock_path();
        tokio::task::spawn_blocking(move || Self::lock_sync(&path))
            .await
            .context("state lock task panicked")?
    }

    async fn load_async(&self) -> Result<PlatformState> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .context("state load task panicked")?
    }

    async fn save_async(&self, state: &PlatformState) -> Result<()> {
        let path = self.path.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&path, &state))
            .await
            .context("state save task panicked")?
    }
}
