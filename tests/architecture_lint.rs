//! Architecture enforcement tests.
//!
//! These read the source tree and fail when a layering rule is broken:
//!
//! 1. **Backend isolation** - only `src/git/interface.rs` names `git2`
//! 2. **Command lifecycle** - every command executes through
//!    `command::run`, the only place that takes a status update
//! 3. **No panics on the library path** - `unwrap()` and `expect()` stay in
//!    tests and doc examples

use std::fs;
use std::path::{Path, PathBuf};

/// Files allowed to use `git2` directly.
const GIT2_ALLOWED: &[&str] = &["src/git/interface.rs"];

/// Modules compiled only under `#[cfg(test)]`.
const TEST_ONLY_FILES: &[&str] = &["src/engine/testing.rs"];

fn rust_files(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).expect("Failed to read source directory") {
        let path = entry.expect("Failed to read entry").path();
        if path.is_dir() {
            rust_files(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs") {
            out.push(path);
        }
    }
}

fn sources() -> Vec<(String, String)> {
    let mut files = Vec::new();
    rust_files(Path::new("src"), &mut files);
    files.sort();
    files
        .into_iter()
        .map(|path| {
            let name = path.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .unwrap_or_else(|_| panic!("Failed to read {}", name));
            (name, content)
        })
        .collect()
}

/// The part of a file before its test module.
fn library_part(content: &str) -> &str {
    match content.find("#[cfg(test)]\nmod tests") {
        Some(end) => &content[..end],
        None => content,
    }
}

fn code_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(i, line)| (i + 1, line))
}

// =============================================================================
// Backend isolation
// =============================================================================

#[test]
fn only_the_git_backend_uses_git2() {
    let violations: Vec<String> = sources()
        .into_iter()
        .filter(|(name, _)| !GIT2_ALLOWED.contains(&name.as_str()))
        .filter(|(_, content)| code_lines(content).any(|(_, line)| line.contains("git2::")))
        .map(|(name, _)| format!("{name}: uses git2 outside the git backend"))
        .collect();

    assert!(
        violations.is_empty(),
        "Architecture violations found:\n  {}",
        violations.join("\n  ")
    );
}

// =============================================================================
// Command lifecycle
// =============================================================================

#[test]
fn commands_execute_through_the_lifecycle() {
    let mut violations = Vec::new();
    let mut commands = 0;

    for (name, content) in sources() {
        if !name.starts_with("src/engine/") {
            continue;
        }
        let impls = content.matches("impl Command for ").count();
        commands += impls;
        if impls > 0 {
            let runs = content.matches("command::run(self)").count();
            if runs != impls {
                violations.push(format!(
                    "{name}: {impls} command(s) but {runs} call(s) to command::run"
                ));
            }
        }
        if name != "src/engine/command.rs" && content.contains("prepare_update") {
            violations.push(format!(
                "{name}: takes a status update outside command::run"
            ));
        }
    }

    assert!(commands >= 6, "expected every command to be found, saw {commands}");
    assert!(
        violations.is_empty(),
        "Architecture violations found:\n  {}",
        violations.join("\n  ")
    );
}

// =============================================================================
// Panics
// =============================================================================

#[test]
fn library_code_does_not_unwrap() {
    let mut violations = Vec::new();

    for (name, content) in sources() {
        if TEST_ONLY_FILES.contains(&name.as_str()) {
            continue;
        }
        for (line_no, line) in code_lines(library_part(&content)) {
            if line.contains(".unwrap()") || line.contains(".expect(") {
                violations.push(format!("{name}:{line_no}: {}", line.trim()));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Library code must propagate errors:\n  {}",
        violations.join("\n  ")
    );
}
