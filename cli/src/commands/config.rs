//! `microsaas config`: show and set configuration values.

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::application::services::config_service;

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
    /// Print the configuration file location
    Path,
}

/// Run the config command.
pub fn run(app: &AppContext, cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show => {
            let config = config_service::load_config(&app.config_store)?;
            let path = app.config_store.path()?;
            app.renderer().config(&config, &path)?;
        }
        ConfigCommand::Set { key, value } => {
            config_service::set_value(&app.config_store, &key, &value)?;
            app.output.success(&format!("Set {key} = {value}"));
        }
        ConfigCommand::Path => {
            println!("{}", app.config_store.path()?.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}
