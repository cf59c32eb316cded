//! Output formatting module

pub mod human;
pub mod json;
pub mod progress;
pub mod reporter;
pub mod styles;

use std::path::Path;

use anyhow::Result;
use console::Term;
use owo_colors::OwoColorize as _;
use serde_json::json;

pub use human::HumanRenderer;
pub use json::JsonRenderer;
pub use reporter::{AppReporter, SilentReporter, TerminalReporter};
pub use styles::Styles;

use crate::application::services::expiry_sweep::SweepReport;
use crate::application::services::instance_supervisor::DestroyReport;
use crate::application::services::queries::{CustomerPage, InstanceSummary, SubscriptionStatus};
use crate::domain::billing::InstanceCreationRequest;
use crate::domain::config::HostConfig;
use crate::domain::instance::Instance;
use crate::domain::port_ledger::PortReservation;
use crate::domain::subscription::Subscription;
use crate::domain::template::ComposeTemplate;

/// Output context carrying styling and terminal state.
pub struct OutputContext {
    /// Stylesheet for colored output.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = !no_color && is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Check if progress indicators should be shown.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// Print a success message prefixed with `✓`. Suppressed when `quiet`.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// Print a warning message prefixed with `⚠`. Suppressed when `quiet`.
    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "⚠".style(self.styles.warning));
        }
    }

    /// Print an error message prefixed with `✗` to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }

    /// Print an info message prefixed with `ℹ`. Suppressed when `quiet`.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "ℹ".style(self.styles.info));
        }
    }

    /// Print a section header. Suppressed when `quiet`.
    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// Print a key-value pair with the key dimmed. Suppressed when `quiet`.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", key.style(self.styles.dim));
        }
    }
}

/// Output mode dispatch: every command result goes through one of these.
pub enum Renderer<'a> {
    Human(HumanRenderer<'a>),
    Json(JsonRenderer),
}

impl Renderer<'_> {
    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn version(&self, version: &str) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_version(version);
                Ok(())
            }
            Self::Json(r) => r.render(&json!({ "version": version })),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn instance(&self, instance: &Instance, url: &str, data_dir: &Path) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_instance(instance, url, data_dir);
                Ok(())
            }
            Self::Json(r) => r.render(&json!({
                "name": instance.name,
                "state": instance.state,
                "http_port": instance.http_port,
                "secondary_port": instance.secondary_port,
                "url": url,
                "data_dir": data_dir,
                "customer": instance.customer,
                "source_document": instance.source_document,
                "template": instance.template,
                "repositories": instance.repositories,
                "created_at": instance.created_at,
            })),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn instances(&self, rows: &[InstanceSummary]) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_instances(rows);
                Ok(())
            }
            Self::Json(r) => r.render(rows),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn instance_log(&self, instance: &Instance) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_log(instance);
                Ok(())
            }
            Self::Json(r) => {
                let entries: Vec<_> = instance.log.entries().collect();
                r.render(&entries)
            }
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn destroyed(&self, report: &DestroyReport) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_destroy(report);
                Ok(())
            }
            Self::Json(r) => r.render(report),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn reservations(&self, records: &[&PortReservation]) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_reservations(records);
                Ok(())
            }
            Self::Json(r) => r.render(records),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn free_ports(&self, ports: &[u16]) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_free_ports(ports);
                Ok(())
            }
            Self::Json(r) => r.render(&json!({ "free": ports })),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn templates(&self, templates: &[ComposeTemplate]) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_templates(templates);
                Ok(())
            }
            Self::Json(r) => r.render(templates),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn template(&self, template: &ComposeTemplate) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_template(template);
                Ok(())
            }
            Self::Json(r) => r.render(template),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn subscription(&self, status: &SubscriptionStatus) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_subscription(status);
                Ok(())
            }
            Self::Json(r) => r.render(status),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn subscriptions(&self, list: &[SubscriptionStatus]) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_subscriptions(list);
                Ok(())
            }
            Self::Json(r) => r.render(list),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn customer_page(&self, page: &CustomerPage) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_customer_page(page);
                Ok(())
            }
            Self::Json(r) => r.render(page),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn renewals(&self, sub: &Subscription) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_renewals(sub);
                Ok(())
            }
            Self::Json(r) => r.render(&sub.renewals),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn sweep(&self, report: &SweepReport) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_sweep(report);
                Ok(())
            }
            Self::Json(r) => r.render(report),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn creation_request(&self, request: &InstanceCreationRequest) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_creation_request(request);
                Ok(())
            }
            Self::Json(r) => r.render(request),
        }
    }

    /// # Errors
    ///
    /// JSON serialization failure.
    pub fn config(&self, config: &HostConfig, path: &Path) -> Result<()> {
        match self {
            Self::Human(r) => {
                r.render_config(config, path);
                Ok(())
            }
            Self::Json(r) => r.render(config),
        }
    }
}
