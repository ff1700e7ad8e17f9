//! Exact-match verification.
//!
//! Byte-for-byte checks of captured output, exit codes, and produced files
//! against the expectations in a test description. Every configured check
//! runs and reports independently; an unconfigured check contributes nothing.

use crate::exec::ExecutionResult;
use crate::schema::{FileCompare, TestSpec};
use serde::Serialize;
use std::path::Path;

/// Which comparison an outcome belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Stdout,
    Stderr,
    ExitCode,
    File(String),
    Trace,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Stdout => write!(f, "stdout"),
            CheckKind::Stderr => write!(f, "stderr"),
            CheckKind::ExitCode => write!(f, "exit code"),
            CheckKind::File(path) => write!(f, "file {path}"),
            CheckKind::Trace => write!(f, "trace"),
        }
    }
}

/// Outcome of one configured check: pass/fail plus a self-contained
/// human-readable diagnostic (empty for a pass).
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub passed: bool,
    pub detail: String,
}

impl CheckOutcome {
    pub fn pass(kind: CheckKind) -> Self {
        CheckOutcome {
            kind,
            passed: true,
            detail: String::new(),
        }
    }

    pub fn fail(kind: CheckKind, detail: String) -> Self {
        CheckOutcome {
            kind,
            passed: false,
            detail,
        }
    }
}

/// Run every check the spec configures against one execution.
///
/// The trace comparison is not handled here: trace output is consumed live
/// while the tool runs, not captured.
pub fn check_all(spec: &TestSpec, result: &ExecutionResult, base: &Path) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::new();
    if let Some(outcome) = check_stdout(spec.stdout.as_deref(), result) {
        outcomes.push(outcome);
    }
    if let Some(outcome) = check_stderr(spec.stderr.as_deref(), result) {
        outcomes.push(outcome);
    }
    if let Some(outcome) = check_exit(spec.exit, result) {
        outcomes.push(outcome);
    }
    outcomes.extend(check_files(&spec.compare_files, base));
    outcomes
}

/// Compare captured stdout against an exact expectation.
/// `None` means the check is skipped.
pub fn check_stdout(expected: Option<&str>, result: &ExecutionResult) -> Option<CheckOutcome> {
    expected.map(|expected| check_stream(CheckKind::Stdout, expected, &result.stdout))
}

/// Compare captured stderr against an exact expectation.
/// `None` means the check is skipped.
pub fn check_stderr(expected: Option<&str>, result: &ExecutionResult) -> Option<CheckOutcome> {
    expected.map(|expected| check_stream(CheckKind::Stderr, expected, &result.stderr))
}

fn check_stream(kind: CheckKind, expected: &str, actual: &[u8]) -> CheckOutcome {
    if actual == expected.as_bytes() {
        return CheckOutcome::pass(kind);
    }
    let actual = String::from_utf8_lossy(actual);
    let detail = format!(
        "{kind}: expected exact match\n  expected: {expected:?}\n  got: {actual:?}"
    );
    CheckOutcome::fail(kind, detail)
}

/// Compare the exit code against an expectation.
/// `None` means the check is skipped. A signal death matches no exit code.
pub fn check_exit(expected: Option<i32>, result: &ExecutionResult) -> Option<CheckOutcome> {
    let expected = expected?;
    let outcome = match result.exit_code {
        Some(actual) if actual == expected => CheckOutcome::pass(CheckKind::ExitCode),
        Some(actual) => CheckOutcome::fail(
            CheckKind::ExitCode,
            format!("Exit code: expected {expected}, got {actual}"),
        ),
        None => {
            let cause = result
                .signal
                .map(|s| format!("signal {s}"))
                .unwrap_or_else(|| "unknown cause".to_string());
            CheckOutcome::fail(
                CheckKind::ExitCode,
                format!("Exit code: expected {expected}, but process was terminated by {cause}"),
            )
        }
    };
    Some(outcome)
}

/// Compare each produced file byte-for-byte against its reference.
///
/// A missing file on either side is a failure naming that side, not a crash.
/// Differing contents are rendered as plain lowercase hex so the two
/// versions can be diffed visually.
pub fn check_files(compares: &[FileCompare], base: &Path) -> Vec<CheckOutcome> {
    compares
        .iter()
        .map(|compare| check_file(compare, base))
        .collect()
}

fn check_file(compare: &FileCompare, base: &Path) -> CheckOutcome {
    let kind = CheckKind::File(compare.actual.display().to_string());
    let reference_path = base.join(&compare.reference);
    let actual_path = base.join(&compare.actual);

    let reference = match std::fs::read(&reference_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return CheckOutcome::fail(
                kind,
                format!(
                    "File compare: could not read the reference file {}: {e}",
                    reference_path.display()
                ),
            );
        }
    };
    let actual = match std::fs::read(&actual_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return CheckOutcome::fail(
                kind,
                format!(
                    "File compare: could not read the produced file {}: {e}",
                    actual_path.display()
                ),
            );
        }
    };

    if reference == actual {
        return CheckOutcome::pass(kind);
    }
    CheckOutcome::fail(
        kind,
        format!(
            "File compare: {} does not match {}\n  reference: {}\n  actual:    {}",
            actual_path.display(),
            reference_path.display(),
            hex(&reference),
            hex(&actual)
        ),
    )
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
