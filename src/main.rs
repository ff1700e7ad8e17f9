use clap::{Parser, Subcommand, ValueEnum};
use reftest::loader::{self, LoadedSpec};
use reftest::runner::{self, CaseResult, Verdict};
use reftest::schema::{self, HarnessConfig, Tool};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with checkmarks
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
}

#[derive(Parser)]
#[command(name = "reftest")]
#[command(about = "A conformance test harness for external assembler and simulator tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute tests against the reference tool
    Run {
        /// Path to test descriptions (file or directory)
        path: PathBuf,
        /// Identifiers of the tests to run (default: all)
        ids: Vec<u32>,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
        /// Filter tests by name (substring match)
        #[arg(short, long)]
        filter: Option<String>,
        /// Reference tool command line (overrides suite config)
        #[arg(long)]
        tool: Option<String>,
        /// Show tool and suite details
        #[arg(short, long)]
        verbose: bool,
    },
    /// Validate test descriptions without running them
    Validate {
        /// Path to test descriptions (file or directory)
        path: PathBuf,
    },
    /// Scaffold a suite: harness config plus a working example test
    Init {
        /// Directory for the new suite
        #[arg(default_value = "tests")]
        dir: PathBuf,
    },
    /// Output the test description schema (for AI consumers)
    Schema,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            path,
            ids,
            output,
            filter,
            tool,
            verbose,
        } => {
            // Determine the suite root for the harness config
            let suite_root = if path.is_file() {
                path.parent().unwrap_or(&path)
            } else {
                &path
            };

            let loaded_config = match loader::load_harness_config(suite_root) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error loading harness config: {e}");
                    std::process::exit(1);
                }
            };

            // CLI --tool overrides the suite config; one of the two must
            // name the tool under test.
            let tool_override = tool.as_deref().and_then(Tool::parse);
            let config = match (loaded_config, tool_override) {
                (Some(mut config), Some(tool)) => {
                    config.tool = tool;
                    config
                }
                (Some(config), None) => config,
                (None, Some(tool)) => HarnessConfig {
                    version: 1,
                    tool,
                    timeout: None,
                    env: HashMap::new(),
                },
                (None, None) => {
                    eprintln!(
                        "No tool configured: add {} to the suite or pass --tool",
                        loader::HARNESS_CONFIG_FILENAME
                    );
                    std::process::exit(1);
                }
            };

            let spec_files = match loader::find_spec_files(&path) {
                Ok(files) => files,
                Err(e) => {
                    eprintln!("Error finding test descriptions: {e}");
                    std::process::exit(1);
                }
            };

            if spec_files.is_empty() {
                eprintln!("No test descriptions found at: {}", path.display());
                std::process::exit(1);
            }

            // A file that fails to load skips only its own tests; the rest
            // of the run proceeds.
            let mut specs: Vec<LoadedSpec> = Vec::new();
            for file in &spec_files {
                match loader::load_spec_file(file) {
                    Ok(loaded) => {
                        let base = spec_base(file);
                        specs.extend(
                            loaded
                                .into_iter()
                                .map(|spec| LoadedSpec { spec, base: base.clone() }),
                        );
                    }
                    Err(e) => {
                        eprintln!("✗ Failed to load {}: {e}", file.display());
                    }
                }
            }

            if let Some(ref needle) = filter {
                specs.retain(|loaded| loaded.spec.name.contains(needle.as_str()));
            }

            if verbose {
                eprintln!(
                    "Tool: {} {}",
                    config.tool.cmd,
                    config.tool.args.join(" ")
                );
                eprintln!("Loaded {} tests from {}", specs.len(), path.display());
            }

            let human = matches!(output, OutputFormat::Human);
            let (summary, results) = runner::run_all(&specs, &config, &ids, |result| {
                if human {
                    print_case(result);
                }
            });

            match output {
                OutputFormat::Human => {
                    println!("\n{summary}");
                }
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "summary": summary,
                        "results": results,
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&output).expect("Failed to serialize")
                    );
                }
            }
            // Per-test outcomes never set the exit code: grading pipelines
            // read the summary. Only harness faults above exit nonzero.
        }
        Command::Validate { path } => {
            let spec_files = match loader::find_spec_files(&path) {
                Ok(files) => files,
                Err(e) => {
                    eprintln!("Error finding test descriptions: {e}");
                    std::process::exit(1);
                }
            };

            if spec_files.is_empty() {
                eprintln!("No test descriptions found at: {}", path.display());
                std::process::exit(1);
            }

            let suite_root = if path.is_file() {
                path.parent().unwrap_or(&path)
            } else {
                &path
            };
            let default_timeout = loader::load_harness_config(suite_root)
                .ok()
                .flatten()
                .and_then(|config| config.timeout);

            let mut errors = 0;
            let mut seen_ids: HashMap<u32, String> = HashMap::new();
            for file in &spec_files {
                match loader::load_spec_file(file) {
                    Ok(specs) => {
                        let mut file_errors = Vec::new();
                        for spec in &specs {
                            if let Err(e) = spec.validate(default_timeout) {
                                file_errors.push(e);
                            }
                            if let Some(other) =
                                seen_ids.insert(spec.id, spec.name.clone())
                            {
                                file_errors.push(format!(
                                    "test '{}': identifier {} already used by '{}'",
                                    spec.name, spec.id, other
                                ));
                            }
                        }
                        if file_errors.is_empty() {
                            println!("✓ {} ({} tests)", file.display(), specs.len());
                        } else {
                            eprintln!("✗ {}:", file.display());
                            for e in file_errors {
                                eprintln!("    {e}");
                            }
                            errors += 1;
                        }
                    }
                    Err(e) => {
                        eprintln!("✗ {}: {e}", file.display());
                        errors += 1;
                    }
                }
            }

            if errors > 0 {
                eprintln!("\n{errors} file(s) failed validation");
                std::process::exit(1);
            }
            println!("\nAll {} file(s) valid", spec_files.len());
        }
        Command::Init { dir } => {
            let config_path = dir.join(loader::HARNESS_CONFIG_FILENAME);
            if config_path.exists() {
                eprintln!("Error: file already exists: {}", config_path.display());
                std::process::exit(1);
            }
            if !dir.exists()
                && let Err(e) = fs::create_dir_all(&dir)
            {
                eprintln!("Error creating directory: {e}");
                std::process::exit(1);
            }

            let config_template = r#"# The reference tool every test invokes:
#   cmd args.. <input artifact> <test args..>
tool:
  cmd: cat
  args: []

# Default timeout in seconds for tests that set none.
# timeout: 10

# Extra environment for every invocation.
# env:
#   LC_ALL: C
"#;
            let example_spec = r#"[
  {
    "name": "example_test",
    "id": 1,
    "input": "hello.txt",
    "stdout": "hello world\n",
    "exit": 0
  }
]
"#;
            let files = [
                (config_path, config_template),
                (dir.join("example.json"), example_spec),
                (dir.join("hello.txt"), "hello world\n"),
            ];
            for (path, contents) in files {
                if let Err(e) = fs::write(&path, contents) {
                    eprintln!("Error writing {}: {e}", path.display());
                    std::process::exit(1);
                }
                println!("Created: {}", path.display());
            }
        }
        Command::Schema => {
            let schema = schema::generate_schema();
            let json = serde_json::to_string_pretty(&schema).expect("Failed to serialize schema");
            println!("{json}");
        }
    }
}

/// The directory a description file's relative paths resolve against.
fn spec_base(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn print_case(result: &CaseResult) {
    let glyph = match result.verdict {
        Verdict::Passed => "✓",
        Verdict::Failed => "✗",
        Verdict::Errored => "⚠",
        Verdict::TimedOut => "⏱",
    };
    println!(
        "{glyph} [{}] {} ({:.2?})",
        result.id, result.name, result.duration
    );
    for detail in result.failure_details() {
        for line in detail.lines() {
            println!("    {line}");
        }
    }
}
