//! Application service: instance lifecycle.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! One `Supervisor` type drives every instance; behavior differences are
//! expressed through `SupervisorPolicy`, not through layered overrides.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use microsaas_common::{InstanceState, PortKind};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::application::ports::{
    Clock, ContainerRuntime, InstanceControl, InstanceFs, PlatformStateStore, PortProbe,
    ProgressReporter, SourceControl, Teardown,
};
use crate::application::services::port_allocator::{
    PortRange, allocate, allocate_pair, excluded_ports, scan,
};
use crate::application::services::subscription;
use crate::domain::app_conf;
use crate::domain::config::HostConfig;
use crate::domain::error::{InstanceError, PortError, ProcessTimeout};
use crate::domain::instance::{
    Action, Instance, PublicEndpoint, RepositoryLine, failure_hint, validate_new_instance,
};
use crate::domain::instance_log::{InstanceLog, LogLevel};
use crate::domain::port_ledger::PortReservation;
use crate::domain::template::{
    DEFAULT_TEMPLATE_NAME, DerivedBindings, bindings_for, declared_images, reconcile_variables,
    render,
};

/// Everything that varies between deployments of the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorPolicy {
    pub data_root: PathBuf,
    /// Bind-test both ports before touching the container runtime.
    pub preflight: bool,
    /// Fetch images under their own timeout before `up`.
    pub pre_pull: bool,
    pub ports: PortRange,
    pub host_reserved: Vec<u16>,
    pub pull_timeout: Duration,
    pub up_timeout: Duration,
    pub teardown_timeout: Duration,
    pub clone_timeout: Duration,
    pub log_max_entries: usize,
    pub log_max_bytes: usize,
    pub endpoint: PublicEndpoint,
}

impl SupervisorPolicy {
    /// Build a policy from host configuration.
    ///
    /// # Errors
    ///
    /// `PortError::InvalidRange` when the configured range is empty.
    pub fn from_config(
        config: &HostConfig,
        data_root: PathBuf,
        endpoint: PublicEndpoint,
    ) -> Result<Self> {
        let sup = &config.supervisor;
        Ok(Self {
            data_root,
            preflight: sup.preflight,
            pre_pull: sup.pre_pull,
            ports: PortRange::new(config.ports.range_start, config.ports.range_end)?,
            host_reserved: config.ports.host_reserved.clone(),
            pull_timeout: Duration::from_secs(sup.pull_timeout_secs),
            up_timeout: Duration::from_secs(sup.up_timeout_secs),
            teardown_timeout: Duration::from_secs(sup.teardown_timeout_secs),
            clone_timeout: Duration::from_secs(sup.clone_timeout_secs),
            log_max_entries: sup.log_max_entries,
            log_max_bytes: sup.log_max_bytes,
            endpoint,
        })
    }
}

/// The ports a supervisor talks to.
pub struct SupervisorDeps<'a, S, P, F, C, V, K, R> {
    pub store: &'a S,
    pub probe: &'a P,
    pub fs: &'a F,
    pub runtime: &'a C,
    pub vcs: &'a V,
    pub clock: &'a K,
    pub reporter: &'a R,
}

/// A request to create one instance.
#[derive(Debug, Clone, Default)]
pub struct NewInstance {
    pub name: String,
    pub template: Option<String>,
    pub customer: Option<String>,
    pub document: Option<String>,
    pub repositories: Vec<RepositoryLine>,
    pub http_port: Option<u16>,
    pub secondary_port: Option<u16>,
}

/// Result of one destroy step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    Skipped(String),
    Failed(String),
}

/// What `destroy` managed to do. Each step ran regardless of the others.
#[derive(Debug, Clone, Serialize)]
pub struct DestroyReport {
    pub name: String,
    pub teardown: StepOutcome,
    pub files: StepOutcome,
    pub record: StepOutcome,
    pub released: Vec<(u16, PortKind)>,
}

pub struct Supervisor<'a, S, P, F, C, V, K, R> {
    deps: SupervisorDeps<'a, S, P, F, C, V, K, R>,
    policy: SupervisorPolicy,
    /// Serializes this supervisor's own tasks; the store lock taken after it
    /// covers other processes. Together they close the probe-then-reserve
    /// window of port allocation.
    state_lock: Mutex<()>,
}

impl<'a, S, P, F, C, V, K, R> Supervisor<'a, S, P, F, C, V, K, R>
where
    S: PlatformStateStore,
    P: PortProbe,
    F: InstanceFs,
    C: ContainerRuntime,
    V: SourceControl,
    K: Clock,
    R: ProgressReporter,
{
    #[must_use]
    pub fn new(deps: SupervisorDeps<'a, S, P, F, C, V, K, R>, policy: SupervisorPolicy) -> Self {
        Self {
            deps,
            policy,
            state_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    /// Public URL of an instance's HTTP port.
    #[must_use]
    pub fn url_of(&self, instance: &Instance) -> String {
        self.policy.endpoint.url(instance.http_port)
    }

    // ── Create ────────────────────────────────────────────────────────────

    /// Register a new `draft` instance. Ports not given explicitly are
    /// allocated from the configured range.
    ///
    /// # Errors
    ///
    /// Name collision, unknown template, invalid ports, exhausted range, or
    /// a state store failure.
    pub async fn create(&self, request: NewInstance) -> Result<Instance> {
        let _guard = self.exclusive().await?;
        let mut state = self.deps.store.load_async().await?;
        if state.name_taken(&request.name) {
            return Err(InstanceError::AlreadyExists(request.name).into());
        }
        let template_name = request.template.as_deref().unwrap_or(DEFAULT_TEMPLATE_NAME);
        let template = state
            .template(template_name)
            .ok_or_else(|| InstanceError::TemplateNotFound(template_name.to_string()))?;

        let mut excluded = excluded_ports(&state, &self.policy.host_reserved);
        let (http_port, secondary_port) = match (request.http_port, request.secondary_port) {
            (Some(http), Some(secondary)) => (http, secondary),
            (Some(http), None) => {
                excluded.insert(http);
                let range = self.range_above(http)?;
                (http, allocate(self.deps.probe, range, &excluded).await?)
            }
            (None, Some(secondary)) => {
                excluded.insert(secondary);
                (allocate(self.deps.probe, self.policy.ports, &excluded).await?, secondary)
            }
            (None, None) => allocate_pair(self.deps.probe, self.policy.ports, &excluded).await?,
        };
        validate_new_instance(&request.name, http_port, secondary_port)?;

        let mut instance = Instance {
            name: request.name.clone(),
            state: InstanceState::Draft,
            http_port,
            secondary_port,
            customer: request.customer,
            source_document: request.document,
            template: Some(template.name.clone()),
            repositories: request.repositories,
            variables: template.variables_by_value(),
            compose_template: template.compose_body,
            config_template: template.config_body,
            rendered_compose: String::new(),
            rendered_config: String::new(),
            log: InstanceLog::with_limits(self.policy.log_max_entries, self.policy.log_max_bytes),
            created_at: self.deps.clock.now(),
        };
        reconcile_variables(
            &mut instance.variables,
            &[&instance.compose_template, &instance.config_template],
        );
        self.note(
            &mut instance,
            LogLevel::Info,
            format!(
                "Created from template '{}' with HTTP port {http_port} and longpolling port {secondary_port}",
                template.name
            ),
        );
        state.instances.insert(instance.name.clone(), instance.clone());
        self.deps.store.save_async(&state).await?;
        Ok(instance)
    }

    fn range_above(&self, port: u16) -> Result<PortRange, PortError> {
        let start = port.checked_add(1).ok_or(PortError::NoPortAvailable {
            start: port,
            end: port,
        })?;
        PortRange::new(start, self.policy.ports.end.max(start))
    }

    // ── Start ─────────────────────────────────────────────────────────────

    /// Bring an instance up.
    ///
    /// Port conflicts found before the runtime is touched are raised as
    /// `PortError` after the instance is marked `error`. Failures later in
    /// the sequence are recorded in the instance log and returned as an
    /// instance in state `error`.
    ///
    /// # Errors
    ///
    /// Unknown instance, `PortError::PortInUse`, `PortError::AlreadyReserved`,
    /// or a state store failure.
    pub async fn start(&self, name: &str) -> Result<Instance> {
        let mut instance = self.claim_ports(name).await?;
        self.deps
            .reporter
            .step(&format!("starting {}...", instance.name));
        self.note(&mut instance, LogLevel::Info, "Starting instance");

        if let Err(err) = self.prepare_tree(&instance) {
            return self.fail(instance, "Preparing instance directory", &err).await;
        }
        self.clone_repositories(&mut instance).await;
        if let Err(err) = self.write_files(&mut instance) {
            return self.fail(instance, "Writing configuration files", &err).await;
        }

        let compose = instance.compose_path(&self.policy.data_root);
        if self.policy.pre_pull {
            self.pre_pull(&mut instance, &compose).await;
        }
        self.teardown_stale(&mut instance, &compose).await;

        self.deps.reporter.step("bringing containers up...");
        match self.deps.runtime.up(&compose, self.policy.up_timeout).await {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                let err = InstanceError::external("compose up", out.status.code(), &stderr_of(&out));
                return self.fail(instance, "Starting containers", &err.into()).await;
            }
            Err(err) => return self.fail(instance, "Starting containers", &err).await,
        }

        instance.state = InstanceState::Running;
        let url = self.url_of(&instance);
        self.note(
            &mut instance,
            LogLevel::Info,
            format!(
                "Instance running at {url}. The first database initialization may take a few minutes."
            ),
        );
        self.commit(&instance).await?;
        self.deps
            .reporter
            .success(&format!("{} running at {url}", instance.name));

        match subscription::activate_draft_for_instance(self.deps.store, self.deps.clock, name)
            .await
        {
            Ok(activated) if !activated.is_empty() => {
                tracing::info!(instance = %name, subscriptions = ?activated, "activated bound subscriptions");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(instance = %name, error = %err, "could not activate bound subscription");
            }
        }
        Ok(instance)
    }

    /// Pre-flight bind test and ledger registration, under the state lock.
    async fn claim_ports(&self, name: &str) -> Result<Instance> {
        let _guard = self.exclusive().await?;
        let mut state = self.deps.store.load_async().await?;
        let mut instance = state.instance(name)?.clone();
        instance
            .log
            .set_limits(self.policy.log_max_entries, self.policy.log_max_bytes);

        // A running instance's own containers hold its ports.
        if self.policy.preflight && instance.state != InstanceState::Running {
            for (kind, port) in instance.ports() {
                if !self.deps.probe.is_free(port).await {
                    let err = PortError::PortInUse {
                        label: kind.label(),
                        port,
                    };
                    instance.state = InstanceState::Error;
                    self.note(&mut instance, LogLevel::Error, err.to_string());
                    state.instances.insert(instance.name.clone(), instance);
                    self.deps.store.save_async(&state).await?;
                    return Err(err.into());
                }
            }
        }

        let now = self.deps.clock.now();
        let mut ledger = state.ledger.clone();
        for (kind, port) in instance.ports() {
            if let Err(err) = ledger.reserve(port, kind, &instance.name, now) {
                instance.state = InstanceState::Error;
                self.note(&mut instance, LogLevel::Error, err.to_string());
                state.instances.insert(instance.name.clone(), instance);
                self.deps.store.save_async(&state).await?;
                return Err(err.into());
            }
        }
        state.ledger = ledger;
        state.instances.insert(instance.name.clone(), instance.clone());
        self.deps.store.save_async(&state).await?;
        Ok(instance)
    }

    fn prepare_tree(&self, instance: &Instance) -> Result<()> {
        let root = &self.policy.data_root;
        for dir in [
            instance.data_dir(root),
            instance.addons_dir(root),
            instance
                .config_path(root)
                .parent()
                .map_or_else(|| instance.data_dir(root), Path::to_path_buf),
        ] {
            self.deps.fs.create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Clone every repository line. A failed clone is logged and skipped.
    async fn clone_repositories(&self, instance: &mut Instance) {
        let addons = instance.addons_dir(&self.policy.data_root);
        for repo in instance.repositories.clone() {
            let dest = addons.join(repo.dir_name());
            if self.deps.fs.exists(&dest) {
                self.note(
                    instance,
                    LogLevel::Info,
                    format!("Repository {} ({}) already present", repo.url, repo.branch),
                );
                continue;
            }
            self.deps
                .reporter
                .step(&format!("cloning {} ({})...", repo.url, repo.branch));
            let result = self
                .deps
                .vcs
                .clone_branch(&repo.url, &repo.branch, &dest, self.policy.clone_timeout)
                .await;
            match result {
                Ok(out) if out.status.success() => self.note(
                    instance,
                    LogLevel::Info,
                    format!("Cloned {} ({})", repo.url, repo.branch),
                ),
                Ok(out) => {
                    let err = InstanceError::external("git clone", out.status.code(), &stderr_of(&out));
                    self.note(
                        instance,
                        LogLevel::Warn,
                        format!("Skipping {} ({}): {err}", repo.url, repo.branch),
                    );
                }
                Err(err) => self.note(
                    instance,
                    LogLevel::Warn,
                    format!("Skipping {} ({}): {err:#}", repo.url, repo.branch),
                ),
            }
        }
    }

    /// Render both templates against the instance's own variables and write them.
    fn write_files(&self, instance: &mut Instance) -> Result<()> {
        let reconciliation = reconcile_variables(
            &mut instance.variables,
            &[&instance.compose_template, &instance.config_template],
        );
        if !reconciliation.added.is_empty() || !reconciliation.pruned.is_empty() {
            tracing::debug!(
                instance = %instance.name,
                added = ?reconciliation.added,
                pruned = ?reconciliation.pruned,
                "reconciled template variables"
            );
        }
        let addons_path = instance.addons_path();
        let bindings = bindings_for(
            &instance.variables,
            DerivedBindings {
                http_port: Some(instance.http_port),
                secondary_port: Some(instance.secondary_port),
                addons_path: &addons_path,
            },
        );
        instance.rendered_compose = render(&instance.compose_template, &bindings);
        instance.rendered_config = app_conf::normalize(&render(&instance.config_template, &bindings));

        let root = &self.policy.data_root;
        let compose_path = instance.compose_path(root);
        let config_path = instance.config_path(root);
        self.deps
            .fs
            .write_file(&compose_path, &instance.rendered_compose)
            .with_context(|| format!("writing {}", compose_path.display()))?;
        self.deps
            .fs
            .write_file(&config_path, &instance.rendered_config)
            .with_context(|| format!("writing {}", config_path.display()))?;
        self.note(instance, LogLevel::Info, "Wrote compose and config files");
        Ok(())
    }

    /// Fetch images out of band. Never fatal: `up` is attempted regardless.
    async fn pre_pull(&self, instance: &mut Instance, compose: &Path) {
        let images = declared_images(&instance.rendered_compose);
        self.deps
            .reporter
            .step(&format!("pulling images: {}...", images.join(", ")));
        match self.deps.runtime.pull(compose, self.policy.pull_timeout).await {
            Ok(out) if out.status.success() => {
                self.note(instance, LogLevel::Info, format!("Pulled {}", images.join(", ")));
            }
            Ok(out) => {
                let stderr = stderr_of(&out);
                let err = InstanceError::external("compose pull", out.status.code(), &stderr);
                self.note(instance, LogLevel::Warn, err.to_string());
                if let Some(hint) = failure_hint(&stderr) {
                    self.note(instance, LogLevel::Warn, hint);
                }
            }
            Err(err) if err.downcast_ref::<ProcessTimeout>().is_some() => {
                self.deps.reporter.warn("image pull timed out, continuing");
                self.note(
                    instance,
                    LogLevel::Warn,
                    format!("{err}; attempting to start anyway"),
                );
            }
            Err(err) => self.note(instance, LogLevel::Warn, format!("Image pull failed: {err:#}")),
        }
    }

    /// Remove leftovers of a previous attempt. Never fatal.
    async fn teardown_stale(&self, instance: &mut Instance, compose: &Path) {
        let result = self
            .deps
            .runtime
            .down(compose, Teardown::RemoveOrphans, self.policy.teardown_timeout)
            .await;
        match result {
            Ok(out) if out.status.success() => {}
            Ok(out) => self.note(
                instance,
                LogLevel::Warn,
                format!("Stale container cleanup failed: {}", stderr_of(&out).trim()),
            ),
            Err(err) => self.note(
                instance,
                LogLevel::Warn,
                format!("Stale container cleanup failed: {err:#}"),
            ),
        }
    }

    /// Record a mid-sequence failure and settle in `error`.
    async fn fail(&self, mut instance: Instance, step: &str, err: &anyhow::Error) -> Result<Instance> {
        instance.state = InstanceState::Error;
        let message = format!("{step} failed: {err:#}");
        self.note(&mut instance, LogLevel::Error, &message);
        if let Some(hint) = failure_hint(&message) {
            self.note(&mut instance, LogLevel::Info, format!("Suggestion: {hint}"));
        }
        self.commit(&instance).await?;
        self.deps
            .reporter
            .warn(&format!("{} failed to start, see 'microsaas instance log'", instance.name));
        Ok(instance)
    }

    // ── Stop / restart ────────────────────────────────────────────────────

    /// Gracefully shut the container set down.
    ///
    /// # Errors
    ///
    /// `InstanceError::NotRunning` unless running. A runtime failure is
    /// logged, leaves the state unchanged, and is returned.
    pub async fn stop(&self, name: &str) -> Result<Instance> {
        let mut instance = self.load_for(name, Action::Stop).await?;
        let compose = instance.compose_path(&self.policy.data_root);
        self.deps.reporter.step(&format!("stopping {name}..."));
        let result = self
            .deps
            .runtime
            .down(&compose, Teardown::Stop, self.policy.teardown_timeout)
            .await;
        if let Err(err) = check(result, "compose down") {
            self.note(&mut instance, LogLevel::Error, format!("Stop failed: {err:#}"));
            self.commit(&instance).await?;
            return Err(err);
        }
        instance.state = InstanceState::Stopped;
        self.note(&mut instance, LogLevel::Info, "Instance stopped");
        self.commit(&instance).await?;
        self.deps.reporter.success(&format!("{name} stopped"));

        if let Err(err) = subscription::pause_notice_for_instance(self.deps.store, name).await {
            tracing::warn!(instance = %name, error = %err, "could not read bound subscriptions");
        }
        Ok(instance)
    }

    /// Restart the container set. On failure the instance is marked
    /// `stopped` and the failure returned.
    ///
    /// # Errors
    ///
    /// `InstanceError::NotRunning` unless running, or the runtime failure.
    pub async fn restart(&self, name: &str) -> Result<Instance> {
        let mut instance = self.load_for(name, Action::Restart).await?;
        let compose = instance.compose_path(&self.policy.data_root);
        self.deps.reporter.step(&format!("restarting {name}..."));
        let result = self
            .deps
            .runtime
            .restart(&compose, self.policy.up_timeout)
            .await;
        if let Err(err) = check(result, "compose restart") {
            instance.state = InstanceState::Stopped;
            self.note(&mut instance, LogLevel::Error, format!("Restart failed: {err:#}"));
            self.commit(&instance).await?;
            return Err(err);
        }
        instance.state = InstanceState::Running;
        self.note(&mut instance, LogLevel::Info, "Instance restarted");
        self.commit(&instance).await?;
        self.deps.reporter.success(&format!("{name} restarted"));
        Ok(instance)
    }

    async fn load_for(&self, name: &str, action: Action) -> Result<Instance> {
        let state = self.deps.store.load_async().await?;
        let instance = state.instance(name)?.clone();
        if !instance.allows(action) {
            return Err(InstanceError::NotRunning {
                name: name.to_string(),
                state: instance.state,
                action: action.as_str(),
            }
            .into());
        }
        Ok(instance)
    }

    // ── Destroy ───────────────────────────────────────────────────────────

    /// Tear down containers and volumes, delete the data directory, release
    /// the ports, and drop the record. Each step runs whatever happened to
    /// the previous one.
    ///
    /// # Errors
    ///
    /// Only when the instance does not exist or state cannot be read.
    pub async fn destroy(&self, name: &str) -> Result<DestroyReport> {
        let instance = self.deps.store.load_async().await?.instance(name)?.clone();
        let root = &self.policy.data_root;
        let compose = instance.compose_path(root);
        self.deps.reporter.step(&format!("destroying {name}..."));

        let teardown = if instance.state == InstanceState::Draft
            && instance.rendered_compose.is_empty()
        {
            StepOutcome::Skipped("never started".to_string())
        } else {
            self.restore_compose_file(&instance, &compose);
            let result = self
                .deps
                .runtime
                .down(&compose, Teardown::Purge, self.policy.teardown_timeout)
                .await;
            match check(result, "compose down -v") {
                Ok(()) => StepOutcome::Done,
                Err(err) => StepOutcome::Failed(format!("{err:#}")),
            }
        };
        log_step(name, "container teardown", &teardown);

        let dir = instance.data_dir(root);
        let files = match self.deps.fs.remove_dir_all(&dir) {
            Ok(()) => StepOutcome::Done,
            Err(err) => StepOutcome::Failed(format!("{err:#}")),
        };
        log_step(name, "data directory removal", &files);

        let (record, released) = match self.forget(name).await {
            Ok(released) => (StepOutcome::Done, released),
            Err(err) => (StepOutcome::Failed(format!("{err:#}")), Vec::new()),
        };
        log_step(name, "port release", &record);

        Ok(DestroyReport {
            name: name.to_string(),
            teardown,
            files,
            record,
            released,
        })
    }

    /// Put the last rendered compose file back when it was removed by hand,
    /// so teardown can still find the containers it describes.
    fn restore_compose_file(&self, instance: &Instance, compose: &Path) {
        if self.deps.fs.exists(compose) || instance.rendered_compose.is_empty() {
            return;
        }
        let restored = compose
            .parent()
            .map_or(Ok(()), |dir| self.deps.fs.create_dir_all(dir))
            .and_then(|()| self.deps.fs.write_file(compose, &instance.rendered_compose));
        match restored {
            Ok(()) => {
                let message = format!(
                    "{}: compose file was missing, restored it for teardown",
                    instance.name
                );
                tracing::warn!(instance = %instance.name, path = %compose.display(), "{message}");
                self.deps.reporter.warn(&message);
            }
            Err(err) => {
                tracing::warn!(instance = %instance.name, error = %err, "could not restore compose file");
            }
        }
    }

    /// Release the instance's reservations, unbind subscriptions, drop the record.
    async fn forget(&self, name: &str) -> Result<Vec<(u16, PortKind)>> {
        let _guard = self.exclusive().await?;
        let mut state = self.deps.store.load_async().await?;
        let released = state.ledger.release_owned_by(name, self.deps.clock.now());
        for reference in state.subscriptions_bound_to(name) {
            if let Ok(sub) = state.subscription_mut(&reference) {
                sub.instance = None;
            }
        }
        state.instances.remove(name);
        self.deps.store.save_async(&state).await?;
        Ok(released)
    }

    // ── Ports ─────────────────────────────────────────────────────────────

    /// Operator release of one reservation.
    ///
    /// # Errors
    ///
    /// `PortError::NotReserved` if the ledger has no such record.
    pub async fn release_port(&self, port: u16, kind: PortKind) -> Result<PortReservation> {
        let _guard = self.exclusive().await?;
        let mut state = self.deps.store.load_async().await?;
        let record = state
            .ledger
            .release(port, kind, self.deps.clock.now())?
            .clone();
        self.deps.store.save_async(&state).await?;
        tracing::info!(port, kind = %kind, owner = %record.instance_name, "released port");
        Ok(record)
    }

    /// Free ports in `range`, by the allocator's rules.
    ///
    /// # Errors
    ///
    /// A state store failure.
    pub async fn scan_ports(&self, range: PortRange, max_results: usize) -> Result<Vec<u16>> {
        let _guard = self.exclusive().await?;
        let state = self.deps.store.load_async().await?;
        let excluded = excluded_ports(&state, &self.policy.host_reserved);
        Ok(scan(self.deps.probe, range, &excluded, max_results).await)
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    /// Append to the instance log and mirror the entry to tracing.
    fn note(&self, instance: &mut Instance, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(instance = %instance.name, "{message}"),
            LogLevel::Warn => tracing::warn!(instance = %instance.name, "{message}"),
            LogLevel::Error => tracing::error!(instance = %instance.name, "{message}"),
        }
        instance.log(self.deps.clock.now(), level, message);
    }

    /// Hold both locks for one load-modify-save cycle.
    async fn exclusive(&self) -> Result<(MutexGuard<'_, ()>, S::Lock)> {
        let local = self.state_lock.lock().await;
        let shared = self.deps.store.lock().await?;
        Ok((local, shared))
    }

    /// Write `instance` back over its stored record.
    async fn commit(&self, instance: &Instance) -> Result<()> {
        let _guard = self.exclusive().await?;
        let mut state = self.deps.store.load_async().await?;
        *state.instance_mut(&instance.name)? = instance.clone();
        self.deps.store.save_async(&state).await
    }
}

impl<S, P, F, C, V, K, R> InstanceControl for Supervisor<'_, S, P, F, C, V, K, R>
where
    S: PlatformStateStore,
    P: PortProbe,
    F: InstanceFs,
    C: ContainerRuntime,
    V: SourceControl,
    K: Clock,
    R: ProgressReporter,
{
    async fn instance_state(&self, name: &str) -> Result<Option<InstanceState>> {
        let state = self.deps.store.load_async().await?;
        Ok(state.instances.get(name).map(|i| i.state))
    }

    async fn start_instance(&self, name: &str) -> Result<InstanceState> {
        self.start(name).await.map(|i| i.state)
    }

    async fn stop_instance(&self, name: &str) -> Result<InstanceState> {
        self.stop(name).await.map(|i| i.state)
    }
}

fn stderr_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Turn a runtime call into `Ok(())` or a descriptive error.
fn check(result: Result<Output>, action: &str) -> Result<()> {
    let out = result?;
    if out.status.success() {
        Ok(())
    } else {
        Err(InstanceError::external(action, out.status.code(), &stderr_of(&out)).into())
    }
}

fn log_step(name: &str, step: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Done => tracing::info!(instance = %name, "{step} done"),
        StepOutcome::Skipped(why) => tracing::info!(instance = %name, "{step} skipped: {why}"),
        StepOutcome::Failed(err) => tracing::warn!(instance = %name, "{step} failed: {err}"),
    }
}
