//! `microsaas template`: manage compose templates.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::app::AppContext;
use crate::application::services::templates;

/// Template subcommands.
#[derive(Subcommand)]
pub enum TemplateCommand {
    /// List templates with their variables
    List,
    /// Add or replace a template
    Add {
        name: String,
        /// docker-compose body with {{PLACEHOLDERS}}
        #[arg(long)]
        compose: PathBuf,
        /// odoo.conf body with {{PLACEHOLDERS}}
        #[arg(long)]
        config: PathBuf,
    },
    /// Show one template
    Show { name: String },
}

/// Run the template command.
pub async fn run(app: &AppContext, cmd: TemplateCommand) -> Result<ExitCode> {
    match cmd {
        TemplateCommand::List => {
            let list = templates::list_templates(&app.state_store).await?;
            app.renderer().templates(&list)?;
        }
        TemplateCommand::Add {
            name,
            compose,
            config,
        } => {
            let compose_body = super::read_text(&compose)?;
            let config_body = super::read_text(&config)?;
            let saved =
                templates::save_template(&app.state_store, &name, &compose_body, &config_body)
                    .await?;
            app.renderer().template(&saved)?;
        }
        TemplateCommand::Show { name } => {
            let template = templates::show_template(&app.state_store, &name).await?;
            app.renderer().template(&template)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
