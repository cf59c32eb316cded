//! Instance domain types, naming rules, and the lifecycle state machine.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use microsaas_common::{InstanceState, PortKind};
use serde::{Deserialize, Serialize};

use crate::domain::error::ValidationError;
use crate::domain::instance_log::{InstanceLog, LogLevel};
use crate::domain::template::{CONTAINER_ADDONS_ROOT, TemplateVariable};

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const CONFIG_DIR: &str = "etc";
pub const CONFIG_FILE: &str = "odoo.conf";
pub const ADDONS_DIR: &str = "addons";

/// One source repository and the branch to clone into the addons tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryLine {
    pub url: String,
    pub branch: String,
}

impl RepositoryLine {
    /// Parse `URL@BRANCH`. The last `@` separates the branch so that
    /// `git@host:org/repo.git@17.0` keeps its SSH user.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidRepository` if either side is empty.
    pub fn parse(spec: &str) -> Result<Self, ValidationError> {
        let (url, branch) = spec
            .rsplit_once('@')
            .filter(|(u, b)| !u.is_empty() && !b.is_empty() && !b.contains(':'))
            .ok_or_else(|| ValidationError::InvalidRepository(spec.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            branch: branch.to_string(),
        })
    }

    /// Directory name under `addons/`: `<repo>_branch_<branch>`.
    #[must_use]
    pub fn dir_name(&self) -> String {
        let last = self
            .url
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or_default();
        let repo = last.trim_end_matches(".git").replace(['.', '-', ' ', '/', '\\'], "_");
        let branch = self.branch.replace('.', "_");
        format!("{repo}_branch_{branch}")
    }
}

/// One provisioned copy of the hosted application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub state: InstanceState,
    pub http_port: u16,
    pub secondary_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    /// Billing document this instance was created from. Set once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub repositories: Vec<RepositoryLine>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    pub compose_template: String,
    pub config_template: String,
    #[serde(default)]
    pub rendered_compose: String,
    #[serde(default)]
    pub rendered_config: String,
    #[serde(default)]
    pub log: InstanceLog,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    /// Absolute directory holding this instance's files.
    #[must_use]
    pub fn data_dir(&self, data_root: &Path) -> PathBuf {
        data_root.join(sanitize_name(&self.name))
    }

    #[must_use]
    pub fn compose_path(&self, data_root: &Path) -> PathBuf {
        self.data_dir(data_root).join(COMPOSE_FILE)
    }

    #[must_use]
    pub fn config_path(&self, data_root: &Path) -> PathBuf {
        self.data_dir(data_root).join(CONFIG_DIR).join(CONFIG_FILE)
    }

    #[must_use]
    pub fn addons_dir(&self, data_root: &Path) -> PathBuf {
        self.data_dir(data_root).join(ADDONS_DIR)
    }

    /// Container-side addons path: one mount per repository, comma-separated.
    #[must_use]
    pub fn addons_path(&self) -> String {
        self.repositories
            .iter()
            .map(|r| format!("{CONTAINER_ADDONS_ROOT}/{}", r.dir_name()))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[must_use]
    pub fn port(&self, kind: PortKind) -> u16 {
        match kind {
            PortKind::Primary => self.http_port,
            PortKind::Secondary => self.secondary_port,
        }
    }

    /// `(kind, port)` pairs in probing order.
    #[must_use]
    pub fn ports(&self) -> [(PortKind, u16); 2] {
        [
            (PortKind::Primary, self.http_port),
            (PortKind::Secondary, self.secondary_port),
        ]
    }

    pub fn log(&mut self, at: DateTime<Utc>, level: LogLevel, message: impl Into<String>) {
        self.log.push(at, level, message);
    }

    /// Whether `action` may run from the current state.
    #[must_use]
    pub fn allows(&self, action: Action) -> bool {
        action.allowed_from(self.state)
    }
}

/// Supervisor operations that the state machine guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Restart,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    /// `start` is valid from any state (re-entry allowed); `stop` and
    /// `restart` only from `running`.
    #[must_use]
    pub fn allowed_from(self, state: InstanceState) -> bool {
        match self {
            Self::Start => true,
            Self::Stop | Self::Restart => state == InstanceState::Running,
        }
    }
}

/// Directory-safe instance name: lowercase, spaces and dots become underscores.
/// Path separators are mapped too so a name never nests directories.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '.', '/', '\\'], "_")
}

/// Suggested instance name for an instance created from a billing document.
#[must_use]
pub fn suggested_name(customer_name: &str, document_name: &str) -> String {
    format!("Instance - {customer_name} - {document_name}")
}

/// Where instances are reachable from outside the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicEndpoint {
    /// Hosted codespace: `https://<alias>-<port>.<domain>`.
    Codespace { alias: String, domain: String },
    /// Plain host: reuse scheme and host of the configured base URL.
    BaseUrl(String),
}

impl PublicEndpoint {
    /// Public URL of a service listening on `port`.
    #[must_use]
    pub fn url(&self, port: u16) -> String {
        match self {
            Self::Codespace { alias, domain } => format!("https://{alias}-{port}.{domain}"),
            Self::BaseUrl(base) => {
                let (scheme, rest) = base.split_once("://").unwrap_or(("http", base));
                let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
                let host = match authority.strip_prefix('[') {
                    Some(v6) => format!("[{}]", v6.split(']').next().unwrap_or_default()),
                    None => authority.split(':').next().unwrap_or_default().to_string(),
                };
                format!("{scheme}://{host}:{port}")
            }
        }
    }
}

/// Operator suggestion for a recognized runtime failure signature.
#[must_use]
pub fn failure_hint(stderr: &str) -> Option<&'static str> {
    let lower = stderr.to_lowercase();
    if lower.contains("port is already allocated") || lower.contains("address already in use") {
        Some("Another container or process holds one of the instance ports. Assign different ports and start again.")
    } else if lower.contains("pull access denied") || lower.contains("not found") {
        Some("An image could not be fetched. Check the image names and tags in the compose template.")
    } else {
        None
    }
}

/// Validate an instance creation request's identity and ports.
///
/// # Errors
///
/// Returns a `ValidationError` for an empty name or identical ports.
pub fn validate_new_instance(
    name: &str,
    http_port: u16,
    secondary_port: u16,
) -> Result<(), ValidationError> {
    if sanitize_name(name).is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if http_port == secondary_port {
        return Err(ValidationError::SamePorts(http_port));
    }
    Ok(())
}
