//! `microsaas instance`: create and drive per-tenant instances.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use microsaas_common::InstanceState;

use crate::app::AppContext;
use crate::application::ports::PlatformStateStore;
use crate::application::services::billing_intake;
use crate::application::services::instance_supervisor::{NewInstance, StepOutcome};
use crate::application::services::queries::instance_summaries;
use crate::domain::instance::{Instance, RepositoryLine};

/// Instance subcommands.
#[derive(Subcommand)]
pub enum InstanceCommand {
    /// Register a new instance (ports allocated unless given)
    Create(CreateArgs),
    /// Render files and bring the containers up
    Start { name: String },
    /// Stop the containers
    Stop { name: String },
    /// Restart the containers
    Restart { name: String },
    /// Tear down containers and volumes, delete files, release ports
    Destroy { name: String },
    /// Show one instance
    Show { name: String },
    /// Show the instance activity log, newest first
    Log { name: String },
    /// List all instances
    List,
    /// Pre-fill a creation request from a paid billing document
    FromDocument {
        /// Billing document (JSON)
        document: PathBuf,
        /// Create the instance right away
        #[arg(long)]
        create: bool,
    },
}

#[derive(Args)]
pub struct CreateArgs {
    /// Instance name
    pub name: String,
    /// Compose template to copy
    #[arg(long)]
    pub template: Option<String>,
    /// Owning customer
    #[arg(long)]
    pub customer: Option<String>,
    /// Billing document the instance was sold on
    #[arg(long)]
    pub document: Option<String>,
    /// Extra addons repository, URL@BRANCH (repeatable)
    #[arg(long = "repo", value_name = "URL@BRANCH", value_parser = RepositoryLine::parse)]
    pub repositories: Vec<RepositoryLine>,
    /// HTTP port (allocated when omitted)
    #[arg(long)]
    pub http_port: Option<u16>,
    /// Longpolling port (allocated when omitted)
    #[arg(long)]
    pub secondary_port: Option<u16>,
}

/// Run the instance command.
pub async fn run(app: &AppContext, cmd: InstanceCommand) -> Result<ExitCode> {
    match cmd {
        InstanceCommand::Create(args) => create(app, args).await,
        InstanceCommand::Start { name } => start(app, &name).await,
        InstanceCommand::Stop { name } => {
            let reporter = app.reporter();
            let instance = app.supervisor(&reporter).stop(&name).await?;
            show_instance(app, &instance)
        }
        InstanceCommand::Restart { name } => {
            let reporter = app.reporter();
            let instance = app.supervisor(&reporter).restart(&name).await?;
            show_instance(app, &instance)
        }
        InstanceCommand::Destroy { name } => destroy(app, &name).await,
        InstanceCommand::Show { name } => {
            let state = app.state_store.load_async().await?;
            show_instance(app, state.instance(&name)?)
        }
        InstanceCommand::Log { name } => {
            let state = app.state_store.load_async().await?;
            app.renderer().instance_log(state.instance(&name)?)?;
            Ok(ExitCode::SUCCESS)
        }
        InstanceCommand::List => {
            let state = app.state_store.load_async().await?;
            app.renderer()
                .instances(&instance_summaries(&state, &app.policy.endpoint))?;
            Ok(ExitCode::SUCCESS)
        }
        InstanceCommand::FromDocument { document, create: now } => {
            from_document(app, document, now).await
        }
    }
}

async fn create(app: &AppContext, args: CreateArgs) -> Result<ExitCode> {
    let reporter = app.reporter();
    let supervisor = app.supervisor(&reporter);
    let instance = supervisor
        .create(NewInstance {
            name: args.name,
            template: args.template,
            customer: args.customer,
            document: args.document,
            repositories: args.repositories,
            http_port: args.http_port,
            secondary_port: args.secondary_port,
        })
        .await?;
    show_instance(app, &instance)
}

async fn start(app: &AppContext, name: &str) -> Result<ExitCode> {
    let reporter = app.reporter();
    let instance = app.supervisor(&reporter).start(name).await?;
    show_instance(app, &instance)?;
    if instance.state == InstanceState::Error {
        app.output
            .error(&format!("Start failed. See: microsaas instance log {name}"));
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn destroy(app: &AppContext, name: &str) -> Result<ExitCode> {
    if !app.confirm(&format!("Destroy {name} and delete its data?"), false)? {
        app.output.info("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }
    let reporter = app.reporter();
    let report = app.supervisor(&reporter).destroy(name).await?;
    drop(reporter);
    app.renderer().destroyed(&report)?;
    let failed = [&report.teardown, &report.files, &report.record]
        .iter()
        .any(|o| matches!(o, StepOutcome::Failed(_)));
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn from_document(app: &AppContext, path: PathBuf, create_now: bool) -> Result<ExitCode> {
    let doc = super::read_document(&path)?;
    let request = billing_intake::instance_from_document(&app.state_store, doc).await?;
    if !create_now {
        app.renderer().creation_request(&request)?;
        return Ok(ExitCode::SUCCESS);
    }
    let reporter = app.reporter();
    let instance = app
        .supervisor(&reporter)
        .create(NewInstance {
            name: request.name,
            customer: Some(request.customer),
            document: Some(request.document),
            ..NewInstance::default()
        })
        .await?;
    show_instance(app, &instance)
}

fn show_instance(app: &AppContext, instance: &Instance) -> Result<ExitCode> {
    let url = app.policy.endpoint.url(instance.http_port);
    let dir = instance.data_dir(&app.policy.data_root);
    app.renderer().instance(instance, &url, &dir)?;
    Ok(ExitCode::SUCCESS)
}
