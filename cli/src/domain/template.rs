//! Compose/config templates and `{{NAME}}` placeholder rendering.
//!
//! Pure string substitution. Unresolved placeholders are left verbatim so that
//! the runtime surfaces a visible error instead of a silently partial config.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // compile-time constant pattern
    Regex::new(r"\{\{([^{}]+)\}\}").expect("valid placeholder pattern")
});

pub const VAR_HTTP_PORT: &str = "HTTP-PORT";
pub const VAR_LONGPOLLING_PORT: &str = "LONGPOLLING-PORT";
pub const VAR_ADDONS_PATH: &str = "ADDONS_PATH";
pub const VAR_DB_HOST: &str = "DB_HOST";
pub const VAR_DB_USER: &str = "DB_USER";
pub const VAR_DB_PASSWORD: &str = "DB_PASSWORD";

/// Mount point of the cloned repositories inside the application container.
pub const CONTAINER_ADDONS_ROOT: &str = "/mnt/extra-addons";

pub const DEFAULT_TEMPLATE_NAME: &str = "default";

/// A named variable owned by one template or one instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateVariable {
    /// Placeholder name without braces, e.g. `HTTP-PORT`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl TemplateVariable {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }
}

/// A parent template that instances are created from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposeTemplate {
    pub name: String,
    pub compose_body: String,
    pub config_body: String,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

impl ComposeTemplate {
    /// Build a template whose variable list is derived from its bodies.
    #[must_use]
    pub fn new(name: &str, compose_body: &str, config_body: &str) -> Self {
        let mut template = Self {
            name: name.to_string(),
            compose_body: compose_body.to_string(),
            config_body: config_body.to_string(),
            variables: Vec::new(),
        };
        reconcile_variables(
            &mut template.variables,
            &[&template.compose_body, &template.config_body],
        );
        template
    }

    /// The template shipped with the tool: application + database services.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(DEFAULT_TEMPLATE_NAME, DEFAULT_COMPOSE_BODY, DEFAULT_CONFIG_BODY)
    }

    /// Copy of the variable list, detached from the template.
    #[must_use]
    pub fn variables_by_value(&self) -> Vec<TemplateVariable> {
        self.variables.clone()
    }
}

pub const DEFAULT_COMPOSE_BODY: &str = r#"services:
  web:
    image: odoo:17
    depends_on:
      - db
    ports:
      - "{{HTTP-PORT}}:8069"
      - "{{LONGPOLLING-PORT}}:8072"
    volumes:
      - ./etc:/etc/odoo
      - ./addons:/mnt/extra-addons
      - web-data:/var/lib/odoo
    environment:
      - HOST={{DB_HOST}}
      - USER={{DB_USER}}
      - PASSWORD={{DB_PASSWORD}}
    restart: unless-stopped
  db:
    image: postgres:15
    environment:
      - POSTGRES_DB=postgres
      - POSTGRES_USER={{DB_USER}}
      - POSTGRES_PASSWORD={{DB_PASSWORD}}
    volumes:
      - db-data:/var/lib/postgresql/data
    restart: unless-stopped
volumes:
  web-data:
  db-data:
"#;

pub const DEFAULT_CONFIG_BODY: &str = "[options]
addons_path = /usr/lib/python3/dist-packages/odoo/addons,{{ADDONS_PATH}}
admin_passwd = admin
data_dir = /var/lib/odoo
db_host = {{DB_HOST}}
db_user = {{DB_USER}}
db_password = {{DB_PASSWORD}}
db_port = 5432
";

/// All distinct placeholder names appearing in `bodies`.
#[must_use]
pub fn scan_placeholders(bodies: &[&str]) -> BTreeSet<String> {
    bodies
        .iter()
        .flat_map(|body| PLACEHOLDER.captures_iter(body))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Substitute `{{NAME}}` occurrences with their binding; unknown names stay verbatim.
#[must_use]
pub fn render(template_body: &str, bindings: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template_body, |cap: &regex::Captures<'_>| {
            let name = cap.get(1).map_or("", |m| m.as_str());
            bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

/// Outcome of [`reconcile_variables`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub added: Vec<String>,
    pub pruned: Vec<String>,
}

/// Bring `owned` in line with the placeholders used in `bodies`.
///
/// Only the variables in `owned` are touched: missing placeholders are added,
/// variables no longer referenced are pruned from this list. A parent
/// template's list is a separate `Vec` and is never modified through here.
pub fn reconcile_variables(owned: &mut Vec<TemplateVariable>, bodies: &[&str]) -> Reconciliation {
    let present = scan_placeholders(bodies);
    let mut result = Reconciliation::default();

    owned.retain(|var| {
        let keep = present.contains(&var.name);
        if !keep {
            result.pruned.push(var.name.clone());
        }
        keep
    });

    for name in &present {
        if !owned.iter().any(|v| &v.name == name) {
            owned.push(TemplateVariable::named(name));
            result.added.push(name.clone());
        }
    }
    result
}

/// Values derived from the instance itself. These always win over stored values.
#[derive(Debug, Clone, Copy)]
pub struct DerivedBindings<'a> {
    pub http_port: Option<u16>,
    pub secondary_port: Option<u16>,
    pub addons_path: &'a str,
}

/// Compute the full binding map for rendering an instance's templates.
///
/// Precedence: derived values, then the variable's stored value, then the
/// database defaults.
#[must_use]
pub fn bindings_for(
    variables: &[TemplateVariable],
    derived: DerivedBindings<'_>,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in [
        (VAR_DB_HOST, "db"),
        (VAR_DB_USER, "odoo"),
        (VAR_DB_PASSWORD, "odoo"),
    ] {
        out.insert(name.to_string(), value.to_string());
    }
    for var in variables {
        if let Some(value) = var.value.as_deref().filter(|v| !v.is_empty()) {
            out.insert(var.name.clone(), value.to_string());
        }
    }
    if let Some(port) = derived.http_port {
        out.insert(VAR_HTTP_PORT.to_string(), port.to_string());
    }
    if let Some(port) = derived.secondary_port {
        out.insert(VAR_LONGPOLLING_PORT.to_string(), port.to_string());
    }
    let addons = if derived.addons_path.is_empty() {
        CONTAINER_ADDONS_ROOT
    } else {
        derived.addons_path
    };
    out.insert(VAR_ADDONS_PATH.to_string(), addons.to_string());
    out
}

/// Image references declared in a rendered compose body, in order of appearance.
#[must_use]
pub fn declared_images(compose_body: &str) -> Vec<String> {
    static IMAGE: LazyLock<Regex> = LazyLock::new(|| {
        #[allow(clippy::expect_used)] // compile-time constant pattern
        Regex::new(r#"(?m)^\s*image:\s*["']?([^\s"']+)"#).expect("valid image pattern")
    });
    let mut images: Vec<String> = Vec::new();
    for cap in IMAGE.captures_iter(compose_body) {
        let image = cap[1].to_string();
        if !images.contains(&image) {
            images.push(image);
        }
    }
    images
}
