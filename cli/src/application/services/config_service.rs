//! Application service: configuration use-cases.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::config::{HostConfig, apply_config_value};

/// Load configuration.
pub fn load_config(store: &impl ConfigStore) -> Result<HostConfig> {
    store.load()
}

/// Save configuration.
pub fn save_config(store: &impl ConfigStore, config: &HostConfig) -> Result<()> {
    store.save(config)
}

/// Validate and persist one setting. Nothing is written if validation fails.
pub fn set_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<HostConfig> {
    let mut config = store.load()?;
    apply_config_value(&mut config, key, value)?;
    store.save(&config)?;
    Ok(config)
}
