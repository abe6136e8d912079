//! Schema linting - static analysis of schema files.
//!
//! Validates schema files for:
//! - JSON syntax errors
//! - Broken $ref references (file not found, pointer or anchor not found)
//! - Regular expressions that fail to compile (treated as never-matching at
//!   resolution time, surfaced here as warnings)
//! - Conflicting combinator keywords

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::loader::load_document;
use crate::object::SchemaDocument;
use crate::resolver::resolve_fragment;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// JSON path to the issue (e.g., "/properties/id/$ref")
    pub path: String,
    pub message: String,
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a file or directory.
///
/// If path is a directory, recursively finds all .json files.
/// If `strict` is true, warnings are treated as errors.
/// Returns aggregated results for all files.
pub fn lint(path: &Path, strict: bool) -> LintResult {
    let files = collect_schema_files(path);
    let mut results = Vec::new();
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for file in &files {
        let file_result = lint_file(file, path);
        total_errors += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        total_warnings += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        results.push(file_result);
    }

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: files.len(),
        passed: files.len() - failed,
        failed,
        errors: total_errors,
        warnings: total_warnings,
        results,
    }
}

/// Lint a single schema file.
pub fn lint_file(file: &Path, base_path: &Path) -> FileResult {
    let mut diagnostics = Vec::new();

    // Try to load the file (checks syntax)
    let document = match load_document(file) {
        Ok(document) => document,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                code: "E001".to_string(),
                file: file.to_path_buf(),
                path: "/".to_string(),
                message: format!("syntax error: {}", e),
            });
            return FileResult {
                file: file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
                status: FileStatus::Error,
                diagnostics,
            };
        }
    };

    let file_dir = file.parent().unwrap_or(Path::new("."));
    check_refs(
        document.data(),
        file,
        file_dir,
        "",
        &document,
        &mut diagnostics,
    );
    check_patterns(document.data(), file, "", &mut diagnostics);
    check_combinators(document.data(), file, "", &mut diagnostics);

    // Missing $schema (warning): the draft defaults to the latest
    if document.data().get("$schema").is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            code: "W002".to_string(),
            file: file.to_path_buf(),
            path: "/".to_string(),
            message: "schema missing $schema declaration".to_string(),
        });
    }

    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let has_warnings = diagnostics.iter().any(|d| d.severity == Severity::Warning);

    let status = if has_errors {
        FileStatus::Error
    } else if has_warnings {
        FileStatus::Warning
    } else {
        FileStatus::Ok
    };

    FileResult {
        file: file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
        status,
        diagnostics,
    }
}

const REF_KEYWORDS: &[&str] = &["$ref", "$dynamicRef", "$recursiveRef"];

/// Recursively check reference values in a schema.
fn check_refs(
    value: &Value,
    file: &Path,
    file_dir: &Path,
    path: &str,
    document: &Arc<SchemaDocument>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        Value::Object(map) => {
            for keyword in REF_KEYWORDS {
                if let Some(Value::String(reference)) = map.get(*keyword) {
                    let ref_path = format!("{}/{}", path, keyword);
                    check_single_ref(reference, file, file_dir, &ref_path, document, diagnostics);
                }
            }

            for (key, child) in map {
                let child_path = format!("{}/{}", path, key);
                check_refs(child, file, file_dir, &child_path, document, diagnostics);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let child_path = format!("{}/{}", path, index);
                check_refs(item, file, file_dir, &child_path, document, diagnostics);
            }
        }
        _ => {}
    }
}

/// Check a single reference value.
fn check_single_ref(
    reference: &str,
    file: &Path,
    file_dir: &Path,
    path: &str,
    document: &Arc<SchemaDocument>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // External URLs can't be validated locally - skip silently
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return;
    }

    let cancel = CancellationToken::new();

    if let Some(fragment) = reference.strip_prefix('#') {
        // Internal reference - check the target resolves
        let resolved = resolve_fragment(document, fragment, &cancel).unwrap_or(None);
        if !matches!(reference, "#" | "#/") && resolved.is_none() {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                code: "E003".to_string(),
                file: file.to_path_buf(),
                path: path.to_string(),
                message: format!("target not found: {}", reference),
            });
        }
        return;
    }

    // File reference (possibly with fragment)
    let (file_part, fragment) = match reference.find('#') {
        Some(idx) => (&reference[..idx], Some(&reference[idx + 1..])),
        None => (reference, None),
    };

    let ref_path = file_dir.join(file_part);
    if !ref_path.exists() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: "E002".to_string(),
            file: file.to_path_buf(),
            path: path.to_string(),
            message: format!("file not found: {}", file_part),
        });
        return;
    }

    // If there's a fragment, check it resolves in the referenced file
    if let Some(fragment) = fragment {
        if !fragment.is_empty() && fragment != "/" {
            match load_document(&ref_path) {
                Ok(target) => {
                    let resolved = resolve_fragment(&target, fragment, &cancel).unwrap_or(None);
                    if resolved.is_none() {
                        diagnostics.push(Diagnostic {
                            severity: Severity::Error,
                            code: "E003".to_string(),
                            file: file.to_path_buf(),
                            path: path.to_string(),
                            message: format!("target not found in {}: #{}", file_part, fragment),
                        });
                    }
                }
                Err(_) => {
                    // If we can't load the ref'd file, that's already an error
                    // from a different check, so don't duplicate
                }
            }
        }
    }
}

/// Recursively check `pattern` and `patternProperties` regexes compile.
fn check_patterns(value: &Value, file: &Path, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if let Value::Object(map) = value {
        if let Some(Value::String(pattern)) = map.get("pattern") {
            if let Err(error) = regex::Regex::new(pattern) {
                diagnostics.push(pattern_diagnostic(
                    file,
                    &format!("{}/pattern", path),
                    pattern,
                    &error,
                ));
            }
        }
        if let Some(Value::Object(patterns)) = map.get("patternProperties") {
            for pattern in patterns.keys() {
                if let Err(error) = regex::Regex::new(pattern) {
                    diagnostics.push(pattern_diagnostic(
                        file,
                        &format!("{}/patternProperties", path),
                        pattern,
                        &error,
                    ));
                }
            }
        }
        for (key, child) in map {
            check_patterns(child, file, &format!("{}/{}", path, key), diagnostics);
        }
    } else if let Value::Array(items) = value {
        for (index, item) in items.iter().enumerate() {
            check_patterns(item, file, &format!("{}/{}", path, index), diagnostics);
        }
    }
}

fn pattern_diagnostic(file: &Path, path: &str, pattern: &str, error: &regex::Error) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        code: "W003".to_string(),
        file: file.to_path_buf(),
        path: path.to_string(),
        message: format!(
            "pattern \"{}\" does not compile and will never match: {}",
            pattern, error
        ),
    }
}

/// Warn on schemas declaring two or more of anyOf/oneOf/allOf at once.
fn check_combinators(value: &Value, file: &Path, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if let Value::Object(map) = value {
        let present: Vec<&str> = ["anyOf", "oneOf", "allOf"]
            .into_iter()
            .filter(|key| map.contains_key(*key))
            .collect();
        if present.len() >= 2 {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                code: "W004".to_string(),
                file: file.to_path_buf(),
                path: if path.is_empty() { "/" } else { path }.to_string(),
                message: format!(
                    "conflicting combinators ({}): the most permissive wins at resolution",
                    present.join(", ")
                ),
            });
        }
        for (key, child) in map {
            check_combinators(child, file, &format!("{}/{}", path, key), diagnostics);
        }
    } else if let Value::Array(items) = value {
        for (index, item) in items.iter().enumerate() {
            check_combinators(item, file, &format!("{}/{}", path, index), diagnostics);
        }
    }
}

/// Collect all .json files in a path (file or directory).
fn collect_schema_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            return vec![path.to_path_buf()];
        }
        return vec![];
    }

    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
