//! Style checks over the production sources of every tricolor crate.
//!
//! Enforces the rules in docs/STYLE.md that clippy does not cover. Test
//! modules at the bottom of a file are exempt.

use std::fs;
use std::path::{Path, PathBuf};

const BANNED_FN_PREFIXES: [&str; 3] = ["get_", "set_", "handle_"];
const BANNED_TYPE_SUFFIXES: [&str; 2] = ["Factory", "Service"];
const BANNED_DATA_SUFFIXES: [&str; 4] = ["Manager", "Handler", "Processor", "Controller"];
const BANNED_MODULES: [&str; 5] = ["utils", "common", "helpers", "misc", "stuff"];

#[derive(Debug, PartialEq, Eq)]
struct Violation {
    line: usize,
    rule: &'static str,
    text: String,
}

/// Production part of a source file, up to its trailing test module.
fn production_lines(source: &str) -> Vec<&str> {
    let lines: Vec<&str> = source.lines().collect();
    let end = lines
        .windows(2)
        .position(|pair| {
            pair[0].trim() == "#[cfg(test)]" && pair[1].trim_start().starts_with("mod ")
        })
        .unwrap_or(lines.len());
    lines[..end].to_vec()
}

fn item_name<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.split_once(keyword)?.1;
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    Some(&rest[..end]).filter(|name| !name.is_empty())
}

fn naming_violations(lines: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (index, raw) in lines.iter().enumerate() {
        let line = raw.trim_start();
        if line.starts_with("//") {
            continue;
        }
        let mut flag = |rule| {
            violations.push(Violation {
                line: index + 1,
                rule,
                text: line.to_string(),
            });
        };

        let banned_fn = item_name(line, "fn ")
            .is_some_and(|name| BANNED_FN_PREFIXES.iter().any(|prefix| name.starts_with(prefix)));
        if banned_fn {
            flag("function prefix");
        }
        for keyword in ["struct ", "enum ", "trait "] {
            let Some(name) = item_name(line, keyword) else {
                continue;
            };
            if BANNED_TYPE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
                flag("type suffix");
            }
            if keyword != "trait "
                && BANNED_DATA_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
            {
                flag("type suffix");
            }
        }
    }
    violations
}

fn errors_doc_violations(lines: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let doc = |index: usize| {
        lines
            .get(index)
            .and_then(|line| line.trim_start().strip_prefix("///"))
            .map(str::trim)
    };

    for index in 0..lines.len() {
        if doc(index) != Some("# Errors") {
            continue;
        }
        let mut flag = |line: usize, text: &str| {
            violations.push(Violation {
                line: line + 1,
                rule: "errors section",
                text: text.to_string(),
            });
        };

        if doc(index + 1) != Some("") {
            flag(index + 1, "missing blank line after # Errors");
            continue;
        }
        let mut cursor = index + 2;
        let mut bullets = 0;
        while let Some(text) = doc(cursor) {
            if text.is_empty() {
                break;
            }
            if !(text.starts_with("- `") && text.contains("` - ")) {
                flag(cursor, text);
            }
            bullets += 1;
            cursor += 1;
        }
        if bullets == 0 {
            flag(index, "no error bullets");
        }
    }
    violations
}

fn dead_code_violations(lines: &[&str]) -> Vec<Violation> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.replace(' ', "").contains("allow(dead_code)"))
        .map(|(index, line)| Violation {
            line: index + 1,
            rule: "dead code allowance",
            text: line.trim().to_string(),
        })
        .collect()
}

fn source_files() -> Vec<PathBuf> {
    fn collect(dir: &Path, files: &mut Vec<PathBuf>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                collect(&path, files);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }

    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("tests crate lives inside the workspace");
    let mut files = Vec::new();
    for crate_name in ["tricolor-core", "tricolor-sim", "tricolor-cli"] {
        collect(&root.join(crate_name).join("src"), &mut files);
    }
    files.sort();
    files
}

fn workspace_violations(check: fn(&[&str]) -> Vec<Violation>) -> Vec<String> {
    let files = source_files();
    assert!(!files.is_empty(), "no tricolor sources found");

    let mut report = Vec::new();
    for path in files {
        let source = fs::read_to_string(&path).expect("source file is readable");
        for violation in check(&production_lines(&source)) {
            report.push(format!(
                "{}:{} [{}] {}",
                path.display(),
                violation.line,
                violation.rule,
                violation.text
            ));
        }
    }
    report
}

#[test]
fn test_workspace_naming() {
    let violations = workspace_violations(naming_violations);
    assert!(violations.is_empty(), "{}", violations.join("\n"));
}

#[test]
fn test_workspace_errors_sections() {
    let violations = workspace_violations(errors_doc_violations);
    assert!(violations.is_empty(), "{}", violations.join("\n"));
}

#[test]
fn test_workspace_has_no_dead_code_allowance() {
    let violations = workspace_violations(dead_code_violations);
    assert!(violations.is_empty(), "{}", violations.join("\n"));
}

#[test]
fn test_workspace_module_names() {
    let banned: Vec<PathBuf> = source_files()
        .into_iter()
        .filter(|path| {
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            let parent = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str());
            [stem, parent]
                .into_iter()
                .flatten()
                .any(|name| BANNED_MODULES.contains(&name))
        })
        .collect();
    assert!(banned.is_empty(), "{banned:?}");
}

#[test]
fn test_naming_rules_flag_accessors_and_role_suffixes() {
    let source = "\
pub fn get_color(&self) -> Color {
fn handle_arrival(token: Token) {
pub struct TokenFactory;
enum BufferManager {
pub trait ArrivalHandler {
pub fn color(&self) -> Color {
fn settle_arrival() {
pub struct BlackBox {
// fn get_ignored_in_comments() {
";
    let lines = production_lines(source);
    let flagged: Vec<usize> = naming_violations(&lines)
        .into_iter()
        .map(|violation| violation.line)
        .collect();
    assert_eq!(flagged, vec![1, 2, 3, 4]);
}

#[test]
fn test_errors_rule_requires_blank_line_and_single_line_bullets() {
    let good = "\
/// Changes the rate.
///
/// # Errors
///
/// - `ConfigError::InvalidRate` - Rate is negative
/// - `ConfigError::InvalidRatio` - Ratio out of range
pub fn update(&self) -> Result<()> {
";
    assert!(errors_doc_violations(&production_lines(good)).is_empty());

    let cramped = "\
/// # Errors
/// - `ConfigError::InvalidRate` - Rate is negative
";
    assert_eq!(errors_doc_violations(&production_lines(cramped)).len(), 1);

    let wrapped = "\
/// # Errors
///
/// - `ConfigError::InvalidRate` - Rate is negative,
///   not finite or too high
";
    let violations = errors_doc_violations(&production_lines(wrapped));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, 4);
}

#[test]
fn test_test_modules_are_exempt() {
    let source = "\
pub fn color(&self) -> Color {
}

#[cfg(test)]
mod tests {
    #[allow(dead_code)]
    fn get_fixture() {}
}
";
    let lines = production_lines(source);
    assert_eq!(lines.len(), 3);
    assert!(dead_code_violations(&lines).is_empty());
    assert!(naming_violations(&lines).is_empty());
    assert_eq!(dead_code_violations(&source.lines().collect::<Vec<_>>()).len(), 1);
}
