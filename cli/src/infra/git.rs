//! Source control adapter over the `git` CLI.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{CommandRunner, SourceControl};

pub struct GitCli<R> {
    runner: R,
}

impl<R: CommandRunner> GitCli<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> SourceControl for GitCli<R> {
    async fn clone_branch(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<Output> {
        let dest = dest.to_string_lossy();
        self.runner
            .run_with_timeout("git", &["clone", "-b", branch, url, &*dest], timeout)
            .await
    }
}
