//! Human-readable terminal renderer.

use std::path::Path;

use owo_colors::OwoColorize as _;

use crate::application::services::expiry_sweep::SweepReport;
use crate::application::services::instance_supervisor::{DestroyReport, StepOutcome};
use crate::application::services::queries::{CustomerPage, InstanceSummary, SubscriptionStatus};
use crate::domain::billing::InstanceCreationRequest;
use crate::domain::config::HostConfig;
use crate::domain::instance::Instance;
use crate::domain::instance_log::LogLevel;
use crate::domain::port_ledger::PortReservation;
use crate::domain::subscription::Subscription;
use crate::domain::template::ComposeTemplate;
use crate::infra::config::CONFIG_ENV;
use crate::infra::state::STATE_ENV;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.info(&format!("microsaas v{version}"));
    }

    // ── Instances ────────────────────────────────────────────────────────

    pub fn render_instance(&self, instance: &Instance, url: &str, data_dir: &Path) {
        let styles = &self.ctx.styles;
        println!();
        println!("  {}", instance.name.style(styles.header));
        println!();
        println!(
            "  {:<14} {}",
            "State:",
            instance.state.style(styles.instance_state(instance.state))
        );
        println!("  {:<14} {}", "HTTP port:", instance.http_port);
        println!("  {:<14} {}", "Longpolling:", instance.secondary_port);
        println!("  {:<14} {url}", "URL:");
        println!("  {:<14} {}", "Data:", data_dir.display());
        if let Some(template) = &instance.template {
            println!("  {:<14} {template}", "Template:");
        }
        if let Some(customer) = &instance.customer {
            println!("  {:<14} {customer}", "Customer:");
        }
        if let Some(doc) = &instance.source_document {
            println!("  {:<14} {doc}", "Document:");
        }
        if !instance.repositories.is_empty() {
            println!("  {}", "Repositories:".style(styles.bold));
            for repo in &instance.repositories {
                println!("    {} @ {}", repo.url, repo.branch);
            }
        }
        if let Some(latest) = instance.log.latest() {
            println!("  {:<14} {latest}", "Last event:");
        }
        println!();
    }

    pub fn render_instances(&self, rows: &[InstanceSummary]) {
        if rows.is_empty() {
            if !self.ctx.quiet {
                println!("No instances. Create one: microsaas instance create <name>");
            }
            return;
        }
        let styles = &self.ctx.styles;
        println!(
            "  {:<28} {:<9} {:>6} {:>6}  {}",
            "NAME".style(styles.dim),
            "STATE".style(styles.dim),
            "HTTP".style(styles.dim),
            "LP".style(styles.dim),
            "URL".style(styles.dim)
        );
        for row in rows {
            println!(
                "  {:<28} {:<9} {:>6} {:>6}  {}",
                row.name,
                row.state.style(styles.instance_state(row.state)),
                row.http_port,
                row.secondary_port,
                row.url
            );
        }
    }

    pub fn render_log(&self, instance: &Instance) {
        if instance.log.is_empty() {
            println!("No log entries for {}.", instance.name);
            return;
        }
        let styles = &self.ctx.styles;
        for entry in instance.log.entries() {
            let level = match entry.level {
                LogLevel::Info => styles.info,
                LogLevel::Warn => styles.warning,
                LogLevel::Error => styles.error,
            };
            println!(
                "{} {} {}",
                entry.at.format("%d/%m/%Y, %H:%M:%S").style(styles.dim),
                format!("[{}]", entry.level).style(level),
                entry.message
            );
        }
    }

    pub fn render_destroy(&self, report: &DestroyReport) {
        for (step, outcome) in [
            ("Container teardown", &report.teardown),
            ("Data directory", &report.files),
            ("Ports and record", &report.record),
        ] {
            match outcome {
                StepOutcome::Done => self.ctx.success(step),
                StepOutcome::Skipped(why) => self.ctx.info(&format!("{step}: skipped ({why})")),
                StepOutcome::Failed(err) => self.ctx.warn(&format!("{step}: {err}")),
            }
        }
        for (port, kind) in &report.released {
            self.ctx.kv("Released:", &format!("{port} ({kind})"));
        }
    }

    // ── Ports ────────────────────────────────────────────────────────────

    pub fn render_reservations(&self, records: &[&PortReservation]) {
        if records.is_empty() {
            if !self.ctx.quiet {
                println!("No port reservations recorded.");
            }
            return;
        }
        let styles = &self.ctx.styles;
        for r in records {
            let status = if r.active {
                "active".style(styles.success).to_string()
            } else {
                "released".style(styles.dim).to_string()
            };
            let released = r
                .released_at
                .map(|t| format!("  released {}", t.format("%Y-%m-%d %H:%M")))
                .unwrap_or_default();
            println!(
                "  {:>5} {:<10} {:<9} {:<28} assigned {}{released}",
                r.port,
                r.kind.to_string(),
                status,
                r.instance_name,
                r.assigned_at.format("%Y-%m-%d %H:%M"),
            );
        }
    }

    pub fn render_free_ports(&self, ports: &[u16]) {
        if ports.is_empty() {
            self.ctx.warn("No free ports in range.");
            return;
        }
        let list: Vec<String> = ports.iter().map(u16::to_string).collect();
        println!("  {}", list.join(" "));
    }

    // ── Templates ────────────────────────────────────────────────────────

    pub fn render_templates(&self, templates: &[ComposeTemplate]) {
        for t in templates {
            let vars: Vec<&str> = t.variables.iter().map(|v| v.name.as_str()).collect();
            println!("  {:<20} {}", t.name, vars.join(", ").style(self.ctx.styles.dim));
        }
    }

    pub fn render_template(&self, template: &ComposeTemplate) {
        let styles = &self.ctx.styles;
        println!("  {}", template.name.style(styles.header));
        println!();
        println!("  {}", "Variables:".style(styles.bold));
        for v in &template.variables {
            println!("    {:<20} {}", v.name, v.value.as_deref().unwrap_or("(unset)"));
        }
        println!();
        println!("  {}", "docker-compose.yml:".style(styles.bold));
        println!("{}", template.compose_body);
        println!("  {}", "odoo.conf:".style(styles.bold));
        println!("{}", template.config_body);
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    pub fn render_subscription(&self, status: &SubscriptionStatus) {
        let styles = &self.ctx.styles;
        println!();
        println!("  {}", status.reference.style(styles.header));
        println!();
        println!(
            "  {:<16} {}",
            "State:",
            status.state.style(styles.subscription_state(status.state))
        );
        println!("  {:<16} {}", "Customer:", status.customer);
        println!("  {:<16} {}", "Plan:", status.plan);
        println!("  {:<16} {}", "Start:", opt(status.start_date));
        println!("  {:<16} {}", "End:", opt(status.end_date));
        println!("  {:<16} {}", "Days remaining:", opt(status.days_remaining));
        println!("  {:<16} {}", "Renewals:", status.renewals);
        if let Some(instance) = &status.instance {
            let url = instance.url.as_deref().unwrap_or("-");
            println!(
                "  {:<16} {} ({}) {url}",
                "Instance:",
                instance.name,
                instance.state.style(styles.instance_state(instance.state))
            );
        }
        println!();
    }

    pub fn render_subscriptions(&self, list: &[SubscriptionStatus]) {
        if list.is_empty() {
            if !self.ctx.quiet {
                println!("No subscriptions.");
            }
            return;
        }
        let styles = &self.ctx.styles;
        for s in list {
            println!(
                "  {:<15} {:<14} {:<16} end {:<10} {:>5}d  {}",
                s.reference,
                s.state.style(styles.subscription_state(s.state)),
                s.customer,
                opt(s.end_date),
                opt(s.days_remaining),
                s.instance.as_ref().map_or("-", |i| i.name.as_str()),
            );
        }
    }

    pub fn render_customer_page(&self, page: &CustomerPage) {
        self.render_subscriptions(&page.items);
        let pages = page.total.div_ceil(page.page_size).max(1);
        self.ctx.kv(
            "Page:",
            &format!("{}/{pages} ({} subscriptions)", page.page, page.total),
        );
    }

    pub fn render_renewals(&self, sub: &Subscription) {
        if sub.renewals.is_empty() {
            println!("{} has not been renewed.", sub.reference);
            return;
        }
        for r in &sub.renewals {
            println!(
                "  #{:<3} {}  {} → {}  {}",
                r.id,
                r.renewed_on,
                opt(r.previous_end),
                r.new_end,
                r.document.as_deref().unwrap_or("")
            );
        }
    }

    pub fn render_sweep(&self, report: &SweepReport) {
        for reference in &report.expired {
            self.ctx.warn(&format!("{reference} expired"));
        }
        for reference in &report.expiring_soon {
            self.ctx.info(&format!("{reference} expiring soon"));
        }
        for name in &report.stopped {
            self.ctx.success(&format!("stopped {name}"));
        }
        for (name, err) in &report.failures {
            self.ctx.error(&format!("could not stop {name}: {err}"));
        }
        if report.expired.is_empty() && report.expiring_soon.is_empty() {
            self.ctx.success("No subscription changes");
        }
    }

    pub fn render_creation_request(&self, request: &InstanceCreationRequest) {
        self.ctx.kv("Name:", &request.name);
        self.ctx.kv("Customer:", &request.customer);
        self.ctx.kv("Document:", &request.document);
    }

    // ── Config ───────────────────────────────────────────────────────────

    /// Render the current host configuration.
    pub fn render_config(&self, config: &HostConfig, path: &Path) {
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        match serde_yaml::to_string(config) {
            Ok(yaml) => {
                for line in yaml.lines() {
                    println!("  {line}");
                }
            }
            Err(e) => self.ctx.error(&format!("cannot render config: {e}")),
        }
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in [CONFIG_ENV, STATE_ENV, "CODESPACE_NAME", "NO_COLOR"] {
            println!(
                "    {:<20} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        println!();
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
