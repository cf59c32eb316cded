//! Normalization of the rendered application config file (`etc/odoo.conf`).
//!
//! The official runtime image crashes on a `logfile` directive (its log
//! directory does not exist) and serves broken assets behind a proxy unless
//! `proxy_mode` is on.

pub const OPTIONS_HEADER: &str = "[options]";
pub const BASE_ADDONS_DIR: &str = "/usr/lib/python3/dist-packages/odoo/addons";
pub const POOL_CEILING_LINE: &str = "db_maxconn = 64";
pub const PROXY_MODE_LINE: &str = "proxy_mode = True";

fn key_of(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    trimmed.split_once('=').map(|(k, _)| k.trim())
}

/// Rewrite `content` so that it:
/// - has exactly one `[options]` header, placed first;
/// - contains no `logfile` directive;
/// - declares `db_maxconn` and `proxy_mode` right under the header;
/// - keeps the runtime's base addons directory in `addons_path`.
#[must_use]
pub fn normalize(content: &str) -> String {
    let mut body: Vec<String> = Vec::new();
    let mut has_pool = false;
    let mut has_proxy = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == OPTIONS_HEADER {
            continue;
        }
        match key_of(line) {
            Some("logfile") => continue,
            Some("addons_path") => {
                let value = line.split_once('=').map_or("", |(_, v)| v.trim());
                if value.split(',').any(|p| p.trim() == BASE_ADDONS_DIR) {
                    body.push(line.to_string());
                } else if value.is_empty() {
                    body.push(format!("addons_path = {BASE_ADDONS_DIR}"));
                } else {
                    body.push(format!("addons_path = {BASE_ADDONS_DIR},{value}"));
                }
                continue;
            }
            Some("db_maxconn") => has_pool = true,
            Some("proxy_mode") => has_proxy = true,
            _ => {}
        }
        body.push(line.to_string());
    }

    let mut out = vec![OPTIONS_HEADER.to_string()];
    if !has_pool {
        out.push(POOL_CEILING_LINE.to_string());
    }
    if !has_proxy {
        out.push(PROXY_MODE_LINE.to_string());
    }
    out.extend(body);
    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}
