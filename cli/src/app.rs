//! Application context: unified state passed to every command handler.
//!
//! Owns the output context, the stores and every infrastructure adapter the
//! services need. Commands borrow from it to build a `Supervisor` per run.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::application::services::instance_supervisor::{
    Supervisor, SupervisorDeps, SupervisorPolicy,
};
use crate::domain::config::HostConfig;
use crate::domain::instance::PublicEndpoint;
use crate::infra::clock::SystemClock;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::compose::ComposeCli;
use crate::infra::config::{YamlConfigStore, expand_home};
use crate::infra::fs::LocalFs;
use crate::infra::git::GitCli;
use crate::infra::network::TcpBindProbe;
use crate::infra::state::JsonStateStore;
use crate::output::{
    AppReporter, HumanRenderer, JsonRenderer, OutputContext, Renderer, SilentReporter,
    TerminalReporter,
};

/// Default forwarding domain of hosted codespaces.
const DEFAULT_CODESPACE_DOMAIN: &str = "app.github.dev";

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `MICROSAAS_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    pub output: OutputFlags,
    pub behaviour: BehaviourFlags,
}

/// The supervisor as wired for the real host.
pub type AppSupervisor<'a> = Supervisor<
    'a,
    JsonStateStore,
    TcpBindProbe,
    LocalFs,
    ComposeCli<TokioCommandRunner>,
    GitCli<TokioCommandRunner>,
    SystemClock,
    AppReporter<'a>,
>;

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    pub config: HostConfig,
    pub config_store: YamlConfigStore,
    pub state_store: JsonStateStore,
    pub runtime: ComposeCli<TokioCommandRunner>,
    pub vcs: GitCli<TokioCommandRunner>,
    pub probe: TcpBindProbe,
    pub fs: LocalFs,
    pub clock: SystemClock,
    pub policy: SupervisorPolicy,
    /// Answer every confirmation with yes (`--yes` or `MICROSAAS_YES`).
    pub assume_yes: bool,
    /// Never prompt; take the prompt's default (`CI` set).
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read, the home
    /// directory cannot be determined, or the configured port range is empty.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let assume_yes = flags.behaviour.yes || std::env::var("MICROSAAS_YES").is_ok();
        let non_interactive = std::env::var("CI").is_ok();

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        let config_store = YamlConfigStore;
        let config = config_store.load()?;
        let data_root = expand_home(&config.data_root)?;
        let endpoint = endpoint_from(
            std::env::var("CODESPACE_NAME").ok(),
            std::env::var("GITHUB_CODESPACES_PORT_FORWARDING_DOMAIN").ok(),
            &config.base_url,
        );
        let policy = SupervisorPolicy::from_config(&config, data_root, endpoint)?;
        let runtime = ComposeCli::new(
            TokioCommandRunner::default(),
            &config.supervisor.compose_program,
        );
        tracing::debug!(data_root = %policy.data_root.display(), "application context ready");

        Ok(Self {
            // Status lines would corrupt the single JSON document on stdout.
            output: OutputContext::new(flags.output.no_color, flags.output.quiet || flags.output.json),
            mode,
            config,
            config_store,
            state_store: JsonStateStore::new()?,
            runtime,
            vcs: GitCli::new(TokioCommandRunner::default()),
            probe: TcpBindProbe,
            fs: LocalFs,
            clock: SystemClock,
            policy,
            assume_yes,
            non_interactive,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress reporter for services; silent in JSON mode so stdout stays
    /// a single document.
    #[must_use]
    pub fn reporter(&self) -> AppReporter<'_> {
        match self.mode {
            OutputMode::Human => AppReporter::Terminal(TerminalReporter::new(&self.output)),
            OutputMode::Json => AppReporter::Silent(SilentReporter),
        }
    }

    /// A supervisor over the real host, reporting through `reporter`.
    #[must_use]
    pub fn supervisor<'a>(&'a self, reporter: &'a AppReporter<'a>) -> AppSupervisor<'a> {
        Supervisor::new(
            SupervisorDeps {
                store: &self.state_store,
                probe: &self.probe,
                fs: &self.fs,
                runtime: &self.runtime,
                vcs: &self.vcs,
                clock: &self.clock,
                reporter,
            },
            self.policy.clone(),
        )
    }

    /// Ask the user for confirmation.
    ///
    /// `--yes` answers yes; in CI the `default` is returned without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}

/// Public endpoint of this host: a codespace when `codespace` is set,
/// otherwise the configured base URL.
#[must_use]
pub fn endpoint_from(
    codespace: Option<String>,
    domain: Option<String>,
    base_url: &str,
) -> PublicEndpoint {
    match codespace.filter(|c| !c.is_empty()) {
        Some(alias) => PublicEndpoint::Codespace {
            alias,
            domain: domain
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_CODESPACE_DOMAIN.to_string()),
        },
        None => PublicEndpoint::BaseUrl(base_url.to_string()),
    }
}
