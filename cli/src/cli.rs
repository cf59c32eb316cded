//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Per-tenant application instances tied to subscriptions
#[derive(Parser)]
#[command(
    name = "microsaas",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage instances
    #[command(subcommand)]
    Instance(commands::instance::InstanceCommand),

    /// Inspect and release reserved ports
    #[command(subcommand)]
    Port(commands::port::PortCommand),

    /// Manage compose templates
    #[command(subcommand)]
    Template(commands::template::TemplateCommand),

    /// Manage subscriptions
    #[command(subcommand)]
    Subscription(commands::subscription::SubscriptionCommand),

    /// Expire and flag subscriptions, stopping expired instances
    Sweep(commands::sweep::SweepArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the application context cannot be built or the
    /// command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            command,
        } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        })?;

        match command {
            Command::Instance(cmd) => commands::instance::run(&app, cmd).await,
            Command::Port(cmd) => commands::port::run(&app, cmd).await,
            Command::Template(cmd) => commands::template::run(&app, cmd).await,
            Command::Subscription(cmd) => commands::subscription::run(&app, cmd).await,
            Command::Sweep(args) => commands::sweep::run(&app, args).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => commands::version::run(&app),
        }
    }
}
