//! `microsaas sweep`: expire and flag subscriptions.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::expiry_sweep;

/// Longest accepted interval between passes: one year.
const MAX_EVERY_HOURS: u64 = 24 * 366;

#[derive(Args)]
pub struct SweepArgs {
    /// Keep running, one pass every HOURS (otherwise a single pass)
    #[arg(
        long,
        value_name = "HOURS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_EVERY_HOURS)
    )]
    pub every: Option<u64>,
}

/// Run the sweep command.
pub async fn run(app: &AppContext, args: SweepArgs) -> Result<ExitCode> {
    let Some(hours) = args.every else {
        return pass(app).await;
    };
    // Each pass renders a report; a loop would print a stream of documents.
    if app.is_json() {
        anyhow::bail!("--every cannot be combined with --json; schedule single passes instead");
    }
    let period = hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("--every {hours} is too long"))?;

    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed pass is retried on the next tick.
                if let Err(err) = pass(app).await {
                    tracing::error!(error = %format!("{err:#}"), "sweep pass failed");
                    app.output.error(&format!("{err:#}"));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("sweep loop interrupted");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }
}

async fn pass(app: &AppContext) -> Result<ExitCode> {
    let reporter = app.reporter();
    let supervisor = app.supervisor(&reporter);
    let report = expiry_sweep::sweep(
        &app.state_store,
        &app.clock,
        &supervisor,
        app.config.subscription.expiring_window_days,
    )
    .await?;
    app.renderer().sweep(&report)?;
    Ok(if report.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
