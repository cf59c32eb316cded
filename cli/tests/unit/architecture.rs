//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries
//! (domain → application → infra/commands/output) hold.

use std::path::{Path, PathBuf};

fn src_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-comment lines outside `#[cfg(test)]` blocks, with their 1-based numbers.
fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut tracker = CfgTestTracker::new();
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            let comment = trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*');
            (!in_test && !comment).then(|| (i + 1, line.to_string()))
        })
        .collect()
}

/// Every production line under `dir` containing one of `forbidden`.
fn scan_for(dir: &Path, forbidden: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(dir) {
        let rel = relative(&file);
        for (lineno, line) in production_lines(&file) {
            for needle in forbidden {
                if line.contains(needle) {
                    violations.push(format!("{rel}:{lineno}: `{needle}`: {}", line.trim()));
                }
            }
        }
    }
    violations
}

// ── Layer boundaries ─────────────────────────────────────────────────────────

#[test]
fn domain_is_pure() {
    let violations = scan_for(
        &src_dir().join("domain"),
        &[
            "crate::application",
            "crate::infra",
            "crate::commands",
            "crate::output",
            "crate::app::",
            "tokio::",
            "std::fs::",
            "std::process::",
            "std::net::",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay free of I/O and outer layers:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_depends_only_on_domain() {
    let violations = scan_for(
        &src_dir().join("application"),
        &[
            "crate::infra",
            "crate::commands",
            "crate::output",
            "crate::app::",
            "std::fs::",
            "std::process::Command",
            "std::net::",
        ],
    );
    assert!(
        violations.is_empty(),
        "application/ must reach the outside world through ports only:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = scan_for(&src_dir().join("infra"), &["crate::commands", "crate::output"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let violations = scan_for(&src_dir().join("infra"), &["println!", "eprintln!"]);
    assert!(
        violations.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)]:\n{}",
        violations.join("\n")
    );
}

#[test]
fn command_runner_is_constructed_only_in_infra_or_app() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir()) {
        let rel = relative(&file).replace('\\', "/");
        if rel.contains("/infra/") || rel.ends_with("app.rs") {
            continue;
        }
        for (lineno, line) in production_lines(&file) {
            if line.contains("TokioCommandRunner::") {
                violations.push(format!("{rel}:{lineno}: {}", line.trim()));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Found TokioCommandRunner outside infra/ and app.rs; use the runtime ports instead:\n{}",
        violations.join("\n")
    );
}

// ── Command handlers ─────────────────────────────────────────────────────────

#[test]
fn no_inline_json_branching_in_commands() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("commands")) {
        let rel = relative(&file);
        for (lineno, line) in production_lines(&file) {
            let trimmed = line.trim();
            if line.contains("json: bool")
                || trimmed.starts_with("if json")
                || trimmed.starts_with("if !json")
            {
                violations.push(format!("{rel}:{lineno}: {trimmed}"));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Found inline JSON branching in commands/; use app.renderer() instead:\n{}",
        violations.join("\n")
    );
}

/// All confirmation prompts in `commands/` must go through `app.confirm()`.
#[test]
fn commands_use_standardized_confirmation() {
    let violations = scan_for(
        &src_dir().join("commands"),
        &["stdin().lock()", "Confirm::new()"],
    );
    assert!(
        violations.is_empty(),
        "Commands must use app.confirm() for user prompts:\n{}",
        violations.join("\n")
    );
}

#[test]
fn commands_do_not_write_state_directly() {
    let violations = scan_for(
        &src_dir().join("commands"),
        &["save_async(", "state_store.save"],
    );
    assert!(
        violations.is_empty(),
        "commands/ must change state through application services:\n{}",
        violations.join("\n")
    );
}

// ── Blocking I/O safety ──────────────────────────────────────────────────────

/// Track whether a line is inside an async fn and outside `spawn_blocking`.
struct AsyncContextTracker {
    in_async_fn: bool,
    in_spawn_blocking: bool,
    brace_depth: i32,
    async_fn_start_depth: i32,
    spawn_blocking_start_depth: i32,
}

impl AsyncContextTracker {
    fn new() -> Self {
        Self {
            in_async_fn: false,
            in_spawn_blocking: false,
            brace_depth: 0,
            async_fn_start_depth: 0,
            spawn_blocking_start_depth: 0,
        }
    }

    /// Returns `true` if the line is in an async fn but NOT in `spawn_blocking`.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("async fn ") && !trimmed.starts_with("//") {
            self.in_async_fn = true;
            self.async_fn_start_depth = self.brace_depth;
        } else if trimmed.contains("fn ") && !trimmed.contains("async ") && !trimmed.starts_with("//")
        {
            self.in_async_fn = false;
            self.in_spawn_blocking = false;
        }
        if self.in_async_fn && line.contains("spawn_blocking") {
            self.in_spawn_blocking = true;
            self.spawn_blocking_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_spawn_blocking && self.brace_depth <= self.spawn_blocking_start_depth
                    {
                        self.in_spawn_blocking = false;
                    }
                    if self.in_async_fn && self.brace_depth <= self.async_fn_start_depth {
                        self.in_async_fn = false;
                    }
                }
                _ => {}
            }
        }
        self.in_async_fn && !self.in_spawn_blocking
    }
}

#[test]
fn infra_async_functions_do_not_use_blocking_fs() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("infra")) {
        let rel = relative(&file);
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let mut tracker = AsyncContextTracker::new();
        for (i, line) in content.lines().enumerate() {
            let unguarded = tracker.process_line(line);
            if unguarded && !line.trim().starts_with("//") && line.contains("std::fs::") {
                violations.push(format!("{rel}:{}: {}", i + 1, line.trim()));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "infra/ async functions must not use blocking std::fs outside spawn_blocking:\n{}",
        violations.join("\n")
    );
}
