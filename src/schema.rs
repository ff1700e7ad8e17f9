//! Schema definitions for reftest suite files.
//!
//! This module defines the structure of test description files and the
//! suite-level harness configuration. Descriptions are written in JSON,
//! YAML, or TOML and validated against these types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default per-test timeout in seconds when neither the spec nor the suite
/// configuration sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Suite-level configuration loaded from `reftest.yaml` in the suite root.
///
/// Names the reference tool under test and provides defaults that apply to
/// every test description in the suite.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HarnessConfig {
    /// Schema version (must match crate major version).
    #[serde(default = "default_version")]
    pub version: u32,

    /// The reference tool every test invokes.
    pub tool: Tool,

    /// Default timeout in seconds for tests that set none.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Extra environment variables for every tool invocation.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}

/// The reference tool: an executable plus the arguments that select its
/// batch mode (e.g. `java -jar venus.jar`).
///
/// The full command line for a test is `cmd args.. <input> <test args..>`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Tool {
    /// The command/binary to execute.
    pub cmd: String,

    /// Arguments placed before the test's input artifact.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Tool {
    /// Parse a whitespace-separated command line (the `--tool` override).
    /// Returns `None` for a blank string.
    pub fn parse(cmdline: &str) -> Option<Tool> {
        let mut parts = cmdline.split_whitespace().map(str::to_string);
        let cmd = parts.next()?;
        Some(Tool {
            cmd,
            args: parts.collect(),
        })
    }
}

/// A single test case description.
///
/// Expectation fields (`stdout`, `stderr`, `exit`) are optional: an absent or
/// null field means that check is skipped entirely, never that an empty or
/// zero value is expected. All relative paths resolve against the directory
/// containing the file the description was loaded from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestSpec {
    /// Display name (used in progress and failure reporting).
    pub name: String,

    /// Unique identifier within a run. Drives run order and filtering.
    pub id: u32,

    /// Path to the input artifact handed to the tool.
    pub input: PathBuf,

    /// Arguments appended after the input artifact.
    #[serde(default)]
    pub args: Vec<String>,

    /// Standard input fed to the tool. Absent means a null stdin.
    #[serde(default)]
    pub stdin: Option<String>,

    /// Expected exact stdout. Absent means the check is skipped.
    #[serde(default)]
    pub stdout: Option<String>,

    /// Expected exact stderr. Absent means the check is skipped.
    #[serde(default)]
    pub stderr: Option<String>,

    /// Expected exit code. Absent means the check is skipped.
    #[serde(default)]
    pub exit: Option<i32>,

    /// Working directory for the tool (defaults to the suite base).
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Timeout in seconds (overrides the suite default).
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Files the tool must produce, compared byte-for-byte against references.
    #[serde(default)]
    pub compare_files: Vec<FileCompare>,

    /// When present, the test streams the tool's stdout through the trace
    /// comparator instead of capturing it for an exact check.
    #[serde(default)]
    pub trace: Option<TraceCheck>,
}

impl TestSpec {
    /// The timeout that actually applies: spec value, else suite default,
    /// else [`DEFAULT_TIMEOUT_SECS`].
    pub fn effective_timeout(&self, suite_default: Option<u64>) -> u64 {
        self.timeout
            .or(suite_default)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Structural validation. A spec that fails here is reported and skipped
    /// without being executed.
    pub fn validate(&self, suite_default: Option<u64>) -> Result<(), String> {
        if self.effective_timeout(suite_default) == 0 {
            return Err(format!(
                "test '{}': timeout must be greater than zero",
                self.name
            ));
        }
        if self.trace.is_some() {
            if self.stdout.is_some() {
                return Err(format!(
                    "test '{}': trace and stdout expectations are mutually exclusive \
                     (the trace comparison consumes stdout)",
                    self.name
                ));
            }
            if self.stderr.is_some() || self.exit.is_some() {
                return Err(format!(
                    "test '{}': stderr and exit expectations do not apply to trace tests \
                     (the tool is terminated by the harness)",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

/// A file produced by the tool, compared byte-for-byte against a reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileCompare {
    /// The known-good file.
    pub reference: PathBuf,

    /// The file the tool run is expected to produce.
    pub actual: PathBuf,
}

/// Trace comparison configuration.
///
/// The expected file holds one regular expression per line; each must match
/// the corresponding line of the tool's stdout in its entirety. Every line
/// the tool actually produced is recorded to `results` when the comparison
/// ends, pass or fail.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TraceCheck {
    /// Expected-trace file (one anchored pattern per line).
    pub expected: PathBuf,

    /// Where to record the lines the tool actually produced.
    pub results: PathBuf,
}

/// Generate the JSON Schema for test description files.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(TestSpec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_spec() {
        let json = r#"{ "name": "addition", "id": 1, "input": "add.s" }"#;
        let spec: TestSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "addition");
        assert_eq!(spec.id, 1);
        assert_eq!(spec.input, PathBuf::from("add.s"));
        assert!(spec.args.is_empty());
        // Absent expectations mean "skip the check", not "expect empty/zero".
        assert_eq!(spec.stdout, None);
        assert_eq!(spec.stderr, None);
        assert_eq!(spec.exit, None);
        assert!(spec.compare_files.is_empty());
        assert!(spec.trace.is_none());
    }

    #[test]
    fn parse_full_spec() {
        let json = r#"
        {
            "name": "fib_output",
            "id": 12,
            "input": "fib.s",
            "args": ["-n", "10"],
            "stdin": "10\n",
            "stdout": "55\n",
            "stderr": "",
            "exit": 0,
            "cwd": "work",
            "timeout": 30,
            "compare_files": [
                { "reference": "ref/fib.hex", "actual": "out/fib.hex" }
            ]
        }"#;
        let spec: TestSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.args, vec!["-n", "10"]);
        assert_eq!(spec.stdin.as_deref(), Some("10\n"));
        assert_eq!(spec.stdout.as_deref(), Some("55\n"));
        // An explicit empty string is a real expectation, distinct from absent.
        assert_eq!(spec.stderr.as_deref(), Some(""));
        assert_eq!(spec.exit, Some(0));
        assert_eq!(spec.timeout, Some(30));
        assert_eq!(spec.compare_files.len(), 1);
        assert_eq!(spec.compare_files[0].reference, PathBuf::from("ref/fib.hex"));
    }

    #[test]
    fn explicit_null_means_skip() {
        let json = r#"{ "name": "t", "id": 3, "input": "t.s", "stdout": null, "exit": null }"#;
        let spec: TestSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.stdout, None);
        assert_eq!(spec.exit, None);
    }

    #[test]
    fn parse_trace_spec_yaml() {
        let yaml = r#"
name: alu_trace
id: 7
input: alu.circ
trace:
  expected: reference_output/alu-ref.out
  results: student_output/alu.out
"#;
        let spec: TestSpec = serde_yaml::from_str(yaml).unwrap();
        let trace = spec.trace.expect("trace block");
        assert_eq!(trace.expected, PathBuf::from("reference_output/alu-ref.out"));
        assert_eq!(trace.results, PathBuf::from("student_output/alu.out"));
    }

    #[test]
    fn timeout_cascade() {
        let spec: TestSpec =
            serde_json::from_str(r#"{ "name": "t", "id": 1, "input": "t.s" }"#).unwrap();
        assert_eq!(spec.effective_timeout(None), DEFAULT_TIMEOUT_SECS);
        assert_eq!(spec.effective_timeout(Some(20)), 20);

        let spec: TestSpec =
            serde_json::from_str(r#"{ "name": "t", "id": 1, "input": "t.s", "timeout": 5 }"#)
                .unwrap();
        assert_eq!(spec.effective_timeout(Some(20)), 5);
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let spec: TestSpec =
            serde_json::from_str(r#"{ "name": "t", "id": 1, "input": "t.s", "timeout": 0 }"#)
                .unwrap();
        let err = spec.validate(None).unwrap_err();
        assert!(err.contains("timeout"), "unexpected message: {err}");
    }

    #[test]
    fn validate_rejects_trace_plus_stdout() {
        let yaml = r#"
name: conflicted
id: 2
input: t.circ
stdout: "hello\n"
trace:
  expected: ref.out
  results: out.txt
"#;
        let spec: TestSpec = serde_yaml::from_str(yaml).unwrap();
        let err = spec.validate(None).unwrap_err();
        assert!(err.contains("mutually exclusive"), "unexpected message: {err}");
    }

    #[test]
    fn validate_rejects_trace_plus_exit() {
        let yaml = r#"
name: conflicted
id: 2
input: t.circ
exit: 0
trace:
  expected: ref.out
  results: out.txt
"#;
        let spec: TestSpec = serde_yaml::from_str(yaml).unwrap();
        let err = spec.validate(None).unwrap_err();
        assert!(err.contains("do not apply"), "unexpected message: {err}");
    }

    #[test]
    fn parse_harness_config() {
        let yaml = r#"
tool:
  cmd: java
  args: ["-jar", "venus.jar"]
timeout: 20
env:
  LC_ALL: C
"#;
        let config: HarnessConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.tool.cmd, "java");
        assert_eq!(config.tool.args, vec!["-jar", "venus.jar"]);
        assert_eq!(config.timeout, Some(20));
        assert_eq!(config.env.get("LC_ALL"), Some(&"C".to_string()));
    }

    #[test]
    fn tool_parse_splits_whitespace() {
        let tool = Tool::parse("java -jar venus.jar").unwrap();
        assert_eq!(tool.cmd, "java");
        assert_eq!(tool.args, vec!["-jar", "venus.jar"]);

        let tool = Tool::parse("logisim").unwrap();
        assert_eq!(tool.cmd, "logisim");
        assert!(tool.args.is_empty());

        assert!(Tool::parse("   ").is_none());
    }

    #[test]
    fn toml_spec_parses() {
        let toml_src = r#"
name = "mem_dump"
id = 4
input = "mem.s"
exit = 2

[[compare_files]]
reference = "ref/mem.dump"
actual = "out/mem.dump"
"#;
        let spec: TestSpec = toml::from_str(toml_src).unwrap();
        assert_eq!(spec.id, 4);
        assert_eq!(spec.exit, Some(2));
        assert_eq!(spec.compare_files.len(), 1);
    }
}
