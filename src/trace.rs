//! Trace comparison.
//!
//! Compares a live output trace line-by-line against an expected-trace file
//! in which every line is a regular expression that must match the
//! corresponding actual line in its entirety. The expected file bounds the
//! comparison: an empty expected line (or its end) stops the loop, so a tool
//! that keeps producing output cannot keep the comparator reading forever.

use regex::Regex;
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;

/// One mismatched trace line.
#[derive(Debug, Clone, Serialize)]
pub struct TraceMismatch {
    /// 1-based line number in the trace.
    pub line: usize,
    /// The pattern the expected file gave for this line.
    pub expected: String,
    /// What the tool actually produced; `None` when its output ended early.
    pub actual: Option<String>,
    /// Set when the expected line was not a valid pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_error: Option<String>,
}

impl TraceMismatch {
    pub fn describe(&self) -> String {
        if let Some(err) = &self.pattern_error {
            return format!(
                "Trace line {}: invalid pattern {:?}: {err}",
                self.line, self.expected
            );
        }
        match &self.actual {
            Some(actual) => format!(
                "Trace line {}: expected pattern {:?}, got {:?}",
                self.line, self.expected, actual
            ),
            None => format!(
                "Trace line {}: expected pattern {:?}, but the output ended early",
                self.line, self.expected
            ),
        }
    }
}

/// Result of comparing a trace against its expected file.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub passed: bool,
    /// Every line actually read from the tool, in order.
    pub lines: Vec<String>,
    pub mismatches: Vec<TraceMismatch>,
}

/// Read one line with the trailing newline (`\n` or `\r\n`) stripped.
///
/// Bytes are decoded lossily so undecodable tool output cannot abort the
/// comparison. Returns `None` at end of stream.
fn read_trimmed_line<R: BufRead>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Compare a live trace against its expected patterns, line by line.
///
/// Each expected line must match the corresponding actual line in its
/// entirety (the pattern is anchored as `^(?:…)$`). A mismatch marks the
/// comparison failed but never stops it: later lines are still checked and
/// recorded. Only reaching the end of the actual stream, or the expected
/// file's own bound, ends the loop.
pub fn compare_trace<A: BufRead, E: BufRead>(
    mut actual: A,
    mut expected: E,
) -> std::io::Result<TraceReport> {
    let mut report = TraceReport {
        passed: true,
        lines: Vec::new(),
        mismatches: Vec::new(),
    };
    let mut line_no = 0usize;

    loop {
        let pattern = match read_trimmed_line(&mut expected)? {
            None => break,
            Some(p) if p.is_empty() => break,
            Some(p) => p,
        };
        line_no += 1;

        let Some(line) = read_trimmed_line(&mut actual)? else {
            report.passed = false;
            report.mismatches.push(TraceMismatch {
                line: line_no,
                expected: pattern,
                actual: None,
                pattern_error: None,
            });
            break;
        };

        let (matched, pattern_error) = match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(re) => (re.is_match(&line), None),
            Err(e) => (false, Some(e.to_string())),
        };
        if !matched {
            report.passed = false;
            report.mismatches.push(TraceMismatch {
                line: line_no,
                expected: pattern,
                actual: Some(line.clone()),
                pattern_error,
            });
        }
        report.lines.push(line);
    }

    Ok(report)
}

/// Record the lines a tool actually produced, one per line.
///
/// Written once the comparison ends, pass or fail, so a mismatched run still
/// leaves its full trace behind for inspection. Parent directories are
/// created on demand.
pub fn write_results(path: &Path, lines: &[String]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut contents = lines.join("\n");
    if !lines.is_empty() {
        contents.push('\n');
    }
    std::fs::write(path, contents)
}
