//! Test execution engine.
//!
//! Drives each test case through its lifecycle (pending, running, then one
//! terminal verdict) and aggregates a run: sequential execution in ascending
//! identifier order with per-case fault containment.

use crate::compare::{self, CheckKind, CheckOutcome};
use crate::exec::{self, Invocation};
use crate::loader::LoadedSpec;
use crate::schema::{HarnessConfig, TestSpec, TraceCheck};
use crate::trace::{self, TraceReport};
use std::collections::HashSet;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

/// Terminal state of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every configured check passed (vacuously true when none).
    Passed,
    /// At least one check failed; all of them were still attempted.
    Failed,
    /// The test could not be judged: spawn failure, missing dependency,
    /// I/O fault, or an invalid description.
    Errored,
    /// The tool was forcibly terminated at the wall-clock deadline.
    TimedOut,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Passed => write!(f, "passed"),
            Verdict::Failed => write!(f, "failed"),
            Verdict::Errored => write!(f, "errored"),
            Verdict::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of running a single test case.
#[derive(Debug, serde::Serialize)]
pub struct CaseResult {
    pub id: u32,
    pub name: String,
    pub verdict: Verdict,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    /// Outcome of every check that ran, passed ones included.
    pub checks: Vec<CheckOutcome>,
    /// Fault description for errored and timed-out cases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    /// The diagnostics a reader needs: any fault plus every failed check.
    pub fn failure_details(&self) -> Vec<&str> {
        self.error
            .iter()
            .map(String::as_str)
            .chain(
                self.checks
                    .iter()
                    .filter(|c| !c.passed)
                    .map(|c| c.detail.as_str()),
            )
            .collect()
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Aggregate counts for one run.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub timed_out: usize,
}

impl RunSummary {
    fn record(&mut self, verdict: Verdict) {
        self.attempted += 1;
        match verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Errored => self.errored += 1,
            Verdict::TimedOut => self.timed_out += 1,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.attempted
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Passed {} / {} tests", self.passed, self.attempted)
    }
}

/// Run one test case through its lifecycle.
///
/// Every fault is caught at this boundary and becomes an `Errored` result;
/// nothing a single test does can abort the run.
pub fn run_case(spec: &TestSpec, base: &Path, config: &HarnessConfig) -> CaseResult {
    let start = Instant::now();
    match run_case_inner(spec, base, config) {
        Ok(result) => result,
        Err(fault) => CaseResult {
            id: spec.id,
            name: spec.name.clone(),
            verdict: Verdict::Errored,
            duration: start.elapsed(),
            checks: Vec::new(),
            error: Some(fault),
        },
    }
}

fn run_case_inner(
    spec: &TestSpec,
    base: &Path,
    config: &HarnessConfig,
) -> Result<CaseResult, String> {
    let start = Instant::now();
    let input = base.join(&spec.input);
    if !input.exists() {
        return Err(format!("input artifact not found: {}", input.display()));
    }

    let invocation = build_invocation(spec, base, config, &input);
    match &spec.trace {
        Some(check) => run_trace_case(spec, base, check, &invocation, start),
        None => run_exact_case(spec, base, config, &invocation, start),
    }
}

/// Assemble the full command line: tool, tool args, input artifact, test args.
fn build_invocation(
    spec: &TestSpec,
    base: &Path,
    config: &HarnessConfig,
    input: &Path,
) -> Invocation {
    let mut args = config.tool.args.clone();
    args.push(input.display().to_string());
    args.extend(spec.args.iter().cloned());
    let cwd = spec
        .cwd
        .as_ref()
        .map(|c| base.join(c))
        .unwrap_or_else(|| base.to_path_buf());
    Invocation {
        program: config.tool.cmd.clone(),
        args,
        cwd,
        env: config.env.clone(),
        stdin: spec.stdin.clone(),
    }
}

fn run_exact_case(
    spec: &TestSpec,
    base: &Path,
    config: &HarnessConfig,
    invocation: &Invocation,
    start: Instant,
) -> Result<CaseResult, String> {
    let timeout = Duration::from_secs(spec.effective_timeout(config.timeout));
    let result = exec::execute(invocation, timeout).map_err(|e| e.to_string())?;

    if result.timed_out {
        return Ok(CaseResult {
            id: spec.id,
            name: spec.name.clone(),
            verdict: Verdict::TimedOut,
            duration: start.elapsed(),
            checks: Vec::new(),
            error: Some(result.exit_description()),
        });
    }

    let checks = compare::check_all(spec, &result, base);
    let verdict = if checks.iter().all(|c| c.passed) {
        Verdict::Passed
    } else {
        Verdict::Failed
    };
    Ok(CaseResult {
        id: spec.id,
        name: spec.name.clone(),
        verdict,
        duration: start.elapsed(),
        checks,
        error: None,
    })
}

fn run_trace_case(
    spec: &TestSpec,
    base: &Path,
    check: &TraceCheck,
    invocation: &Invocation,
    start: Instant,
) -> Result<CaseResult, String> {
    let expected_path = base.join(&check.expected);
    let expected = std::fs::File::open(&expected_path).map_err(|e| {
        format!(
            "could not open the expected trace {}: {e}",
            expected_path.display()
        )
    })?;

    let mut guard = exec::spawn_streaming(invocation).map_err(|e| e.to_string())?;
    let stdout = guard
        .take_stdout()
        .ok_or_else(|| "tool stdout was not captured".to_string())?;
    let report = trace::compare_trace(BufReader::new(stdout), BufReader::new(expected))
        .map_err(|e| format!("failed reading the trace: {e}"))?;
    // Terminate the tool before touching the filesystem.
    drop(guard);

    let results_path = base.join(&check.results);
    trace::write_results(&results_path, &report.lines).map_err(|e| {
        format!(
            "could not write results to {}: {e}",
            results_path.display()
        )
    })?;

    let mut checks = vec![trace_outcome(&report)];
    checks.extend(compare::check_files(&spec.compare_files, base));
    let verdict = if checks.iter().all(|c| c.passed) {
        Verdict::Passed
    } else {
        Verdict::Failed
    };
    Ok(CaseResult {
        id: spec.id,
        name: spec.name.clone(),
        verdict,
        duration: start.elapsed(),
        checks,
        error: None,
    })
}

fn trace_outcome(report: &TraceReport) -> CheckOutcome {
    if report.passed {
        return CheckOutcome::pass(CheckKind::Trace);
    }
    let detail = report
        .mismatches
        .iter()
        .map(|m| m.describe())
        .collect::<Vec<_>>()
        .join("\n");
    CheckOutcome::fail(CheckKind::Trace, detail)
}

/// Run a whole suite: validate, filter, order, then execute sequentially.
///
/// `allow` is an identifier allow-list; empty means every test runs. The
/// observer sees each result as it is produced, so progress can be reported
/// live. Exactly one tool process runs at a time; the only concurrency in a
/// run lives inside a single execution.
pub fn run_all(
    specs: &[LoadedSpec],
    config: &HarnessConfig,
    allow: &[u32],
    mut observer: impl FnMut(&CaseResult),
) -> (RunSummary, Vec<CaseResult>) {
    let mut ordered: Vec<&LoadedSpec> = specs
        .iter()
        .filter(|loaded| allow.is_empty() || allow.contains(&loaded.spec.id))
        .collect();
    ordered.sort_by_key(|loaded| loaded.spec.id);

    let mut summary = RunSummary::default();
    let mut results = Vec::new();
    let mut seen = HashSet::new();

    for loaded in ordered {
        let spec = &loaded.spec;
        // Structural faults are contained exactly like execution faults: the
        // affected test is reported as errored and the run moves on.
        let result = if !seen.insert(spec.id) {
            errored(spec, format!("test '{}': duplicate identifier {}", spec.name, spec.id))
        } else if let Err(fault) = spec.validate(config.timeout) {
            errored(spec, fault)
        } else {
            run_case(spec, &loaded.base, config)
        };
        summary.record(result.verdict);
        observer(&result);
        results.push(result);
    }

    (summary, results)
}

fn errored(spec: &TestSpec, fault: String) -> CaseResult {
    CaseResult {
        id: spec.id,
        name: spec.name.clone(),
        verdict: Verdict::Errored,
        duration: Duration::ZERO,
        checks: Vec::new(),
        error: Some(fault),
    }
}
