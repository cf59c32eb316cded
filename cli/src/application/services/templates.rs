//! Application service: compose template catalog.

use anyhow::Result;

use crate::application::ports::PlatformStateStore;
use crate::domain::error::InstanceError;
use crate::domain::template::{ComposeTemplate, DEFAULT_TEMPLATE_NAME};

/// Stored templates plus the built-in default unless it is shadowed.
///
/// # Errors
///
/// A state store failure.
pub async fn list_templates(store: &impl PlatformStateStore) -> Result<Vec<ComposeTemplate>> {
    let state = store.load_async().await?;
    let mut templates: Vec<ComposeTemplate> = state.templates.values().cloned().collect();
    if !state.templates.contains_key(DEFAULT_TEMPLATE_NAME) {
        templates.insert(0, ComposeTemplate::builtin());
    }
    Ok(templates)
}

/// # Errors
///
/// `InstanceError::TemplateNotFound` or a state store failure.
pub async fn show_template(store: &impl PlatformStateStore, name: &str) -> Result<ComposeTemplate> {
    let state = store.load_async().await?;
    Ok(state
        .template(name)
        .ok_or_else(|| InstanceError::TemplateNotFound(name.to_string()))?)
}

/// Add or replace a template. Its variable list is derived from the bodies.
/// Instances created earlier keep their own copies.
///
/// # Errors
///
/// A state store failure.
pub async fn save_template(
    store: &impl PlatformStateStore,
    name: &str,
    compose_body: &str,
    config_body: &str,
) -> Result<ComposeTemplate> {
    let _lock = store.lock().await?;
    let mut state = store.load_async().await?;
    let mut template = ComposeTemplate::new(name, compose_body, config_body);
    if let Some(previous) = state.templates.get(name) {
        for var in &mut template.variables {
            if let Some(old) = previous.variables.iter().find(|v| v.name == var.name) {
                var.value.clone_from(&old.value);
            }
        }
    }
    state.templates.insert(name.to_string(), template.clone());
    store.save_async(&state).await?;
    Ok(template)
}
