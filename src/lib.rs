//! Conformance test harness for external tools.
//!
//! reftest runs a reference tool (an assembler, a simulator, any opaque
//! executable) against a suite of test artifacts and judges each run by the
//! comparison strategies its description configures:
//!
//! 1. **Exact matching**: captured stdout/stderr, exit code, and produced
//!    files checked byte-for-byte against expectations. Absent expectations
//!    are skipped, never defaulted.
//! 2. **Trace comparison**: the tool's stdout streamed line-by-line against
//!    an expected-trace file of anchored regular expressions, with every
//!    actual line recorded to a results file.
//!
//! Tests run sequentially in ascending identifier order; one bad test is
//! reported and contained, never allowed to abort the run. All expectations
//! live in data files, none in code.

pub mod compare;
pub mod exec;
pub mod loader;
pub mod runner;
pub mod schema;
pub mod trace;

pub use compare::{CheckKind, CheckOutcome};
pub use exec::{ExecError, ExecutionResult, Invocation, ProcessGuard};
pub use loader::{LoadError, LoadedSpec};
pub use runner::{CaseResult, RunSummary, Verdict};
pub use schema::{FileCompare, HarnessConfig, TestSpec, Tool, TraceCheck};
pub use trace::{TraceMismatch, TraceReport};
