//! Command implementations

pub mod config;
pub mod instance;
pub mod port;
pub mod subscription;
pub mod sweep;
pub mod template;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::billing::BillingDocument;

/// Read a billing document handed over by the invoicing workflow.
fn read_document(path: &Path) -> Result<BillingDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a billing document", path.display()))
}

/// Read a text file given on the command line.
fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}
