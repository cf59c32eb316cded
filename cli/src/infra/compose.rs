//! Container runtime adapter over the compose CLI.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{CommandRunner, ContainerRuntime, Teardown};

/// Drives `docker-compose` (or `docker compose`) with `-f <file>`.
pub struct ComposeCli<R> {
    runner: R,
    program: String,
    /// Leading arguments when the program is a plugin host, e.g. `compose`
    /// for `docker compose`.
    prefix: Vec<String>,
}

impl<R: CommandRunner> ComposeCli<R> {
    /// `program` may carry a subcommand, as in `"docker compose"`.
    #[must_use]
    pub fn new(runner: R, program: &str) -> Self {
        let mut parts = program.split_whitespace().map(str::to_string);
        let head = parts.next().unwrap_or_else(|| "docker-compose".to_string());
        Self {
            runner,
            program: head,
            prefix: parts.collect(),
        }
    }

    async fn compose(&self, file: &Path, args: &[&str], timeout: Duration) -> Result<Output> {
        let file = file.to_string_lossy();
        let mut argv: Vec<&str> = self.prefix.iter().map(String::as_str).collect();
        argv.extend(["-f", &*file]);
        argv.extend_from_slice(args);
        self.runner
            .run_with_timeout(&self.program, &argv, timeout)
            .await
    }
}

/// Arguments for `down` in each teardown mode.
#[must_use]
pub fn down_args(mode: Teardown) -> &'static [&'static str] {
    match mode {
        Teardown::Stop => &["down"],
        Teardown::RemoveOrphans => &["down", "--remove-orphans"],
        Teardown::Purge => &["down", "-v", "--remove-orphans"],
    }
}

impl<R: CommandRunner> ContainerRuntime for ComposeCli<R> {
    async fn pull(&self, compose_file: &Path, timeout: Duration) -> Result<Output> {
        self.compose(compose_file, &["pull"], timeout).await
    }

    async fn up(&self, compose_file: &Path, timeout: Duration) -> Result<Output> {
        self.compose(compose_file, &["up", "-d"], timeout).await
    }

    async fn down(&self, compose_file: &Path, mode: Teardown, timeout: Duration) -> Result<Output> {
        self.compose(compose_file, down_args(mode), timeout).await
    }

    async fn restart(&self, compose_file: &Path, timeout: Duration) -> Result<Output> {
        self.compose(compose_file, &["restart"], timeout).await
    }
}
