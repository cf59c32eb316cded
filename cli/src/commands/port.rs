//! `microsaas port`: inspect the port ledger and release reservations.

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;
use microsaas_common::{InstanceState, PortKind};

use crate::app::AppContext;
use crate::application::ports::PlatformStateStore;
use crate::application::services::port_allocator::PortRange;

/// Default number of ports `port scan` lists.
const DEFAULT_SCAN_MAX: usize = 20;

/// Port subcommands.
#[derive(Subcommand)]
pub enum PortCommand {
    /// Show port reservations, active and released
    List {
        /// Only this instance's reservations
        #[arg(long)]
        instance: Option<String>,
    },
    /// Release one active reservation
    Release {
        port: u16,
        #[arg(value_enum)]
        kind: PortKind,
    },
    /// List free ports an instance could take
    Scan {
        /// First port (defaults to the configured range)
        #[arg(long)]
        from: Option<u16>,
        /// Last port (defaults to the configured range)
        #[arg(long)]
        to: Option<u16>,
        /// Stop after this many ports
        #[arg(long, default_value_t = DEFAULT_SCAN_MAX)]
        max: usize,
    },
}

/// Run the port command.
pub async fn run(app: &AppContext, cmd: PortCommand) -> Result<ExitCode> {
    match cmd {
        PortCommand::List { instance } => {
            let state = app.state_store.load_async().await?;
            let records = match instance.as_deref() {
                Some(name) => state.ledger.records_for(name),
                None => state.ledger.records(),
            };
            app.renderer().reservations(&records)?;
            Ok(ExitCode::SUCCESS)
        }
        PortCommand::Release { port, kind } => release(app, port, kind).await,
        PortCommand::Scan { from, to, max } => {
            let range = PortRange::new(
                from.unwrap_or(app.policy.ports.start),
                to.unwrap_or(app.policy.ports.end),
            )?;
            let reporter = app.reporter();
            let free = app.supervisor(&reporter).scan_ports(range, max).await?;
            app.renderer().free_ports(&free)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn release(app: &AppContext, port: u16, kind: PortKind) -> Result<ExitCode> {
    let state = app.state_store.load_async().await?;
    let owner_running = state
        .ledger
        .get(port, kind)
        .filter(|r| r.active)
        .and_then(|r| state.instances.get(&r.instance_name))
        .filter(|i| i.state == InstanceState::Running)
        .map(|i| i.name.clone());

    if let Some(owner) = owner_running {
        let prompt = format!("Instance {owner} is running on port {port}. Release it anyway?");
        if !app.confirm(&prompt, false)? {
            app.output.info("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let reporter = app.reporter();
    let record = app.supervisor(&reporter).release_port(port, kind).await?;
    app.renderer().reservations(&[&record])?;
    app.output.success(&format!("Released {port} ({kind})"));
    Ok(ExitCode::SUCCESS)
}
