//! Filesystem infrastructure: implements `InstanceFs`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::InstanceFs;

/// Production filesystem implementation of `InstanceFs`.
pub struct LocalFs;

impl InstanceFs for LocalFs {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating directory {}", path.display()))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        std::fs::write(path, contents).with_context(|| format!("writing file {}", path.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.with_context(|| format!("removing directory {}", path.display())),
        }
    }
}
