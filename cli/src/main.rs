//! MicroSaaS CLI - per-tenant application instances tied to subscriptions

use std::process::ExitCode;

use clap::Parser;
use microsaas_cli::cli::Cli;
use microsaas_cli::output::json::{error_code, format_error};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the diagnostics filter.
const LOG_ENV: &str = "MICROSAAS_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            if json {
                match format_error(&format!("{e:#}"), error_code(&e)) {
                    Ok(out) => println!("{out}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
