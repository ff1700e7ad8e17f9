//! Suite file loader.
//!
//! Loads and parses test description files and the harness configuration
//! from disk.

use crate::schema::{HarnessConfig, TestSpec};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Error type for suite loading operations.
#[derive(Debug)]
pub enum LoadError {
    /// Failed to read the file.
    Io(std::io::Error),
    /// Failed to parse JSON.
    Json(serde_json::Error),
    /// Failed to parse YAML.
    Yaml(serde_yaml::Error),
    /// Failed to parse TOML.
    Toml(toml::de::Error),
    /// Unsupported file extension.
    UnsupportedFormat(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "failed to read file: {e}"),
            LoadError::Json(e) => write!(f, "invalid JSON: {e}"),
            LoadError::Yaml(e) => write!(f, "invalid YAML: {e}"),
            LoadError::Toml(e) => write!(f, "invalid TOML: {e}"),
            LoadError::UnsupportedFormat(ext) => {
                write!(
                    f,
                    "unsupported file format: {ext} (expected .json, .yaml, .yml, or .toml)"
                )
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// The name of the harness configuration file.
pub const HARNESS_CONFIG_FILENAME: &str = "reftest.yaml";

/// A test description together with the directory its relative paths
/// resolve against (the directory of the file it was loaded from).
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub spec: TestSpec,
    pub base: PathBuf,
}

/// Helper for files that hold either a single description or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(TestSpec),
    Many(Vec<TestSpec>),
}

impl From<OneOrMany> for Vec<TestSpec> {
    fn from(parsed: OneOrMany) -> Self {
        match parsed {
            OneOrMany::One(spec) => vec![spec],
            OneOrMany::Many(specs) => specs,
        }
    }
}

/// Load the test descriptions in a single file.
///
/// JSON and YAML files may hold one description or an array of them; a TOML
/// file holds exactly one.
pub fn load_spec_file(path: &Path) -> Result<Vec<TestSpec>, LoadError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let contents = std::fs::read_to_string(path).map_err(LoadError::Io)?;

    match ext {
        "json" => serde_json::from_str::<OneOrMany>(&contents)
            .map(Vec::from)
            .map_err(LoadError::Json),
        "yaml" | "yml" => serde_yaml::from_str::<OneOrMany>(&contents)
            .map(Vec::from)
            .map_err(LoadError::Yaml),
        "toml" => toml::from_str::<TestSpec>(&contents)
            .map(|spec| vec![spec])
            .map_err(LoadError::Toml),
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

/// Load harness configuration from a directory.
///
/// Looks for `reftest.yaml` in the given directory.
/// Returns `None` if the file doesn't exist, `Err` if it exists but is invalid.
pub fn load_harness_config(dir: &Path) -> Result<Option<HarnessConfig>, LoadError> {
    let config_path = dir.join(HARNESS_CONFIG_FILENAME);

    if !config_path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&config_path).map_err(LoadError::Io)?;
    let config: HarnessConfig = serde_yaml::from_str(&contents).map_err(LoadError::Yaml)?;
    Ok(Some(config))
}

/// Find all description files in a directory or return the single file.
pub fn find_spec_files(path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    collect_spec_files_recursive(path, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_spec_files_recursive(
    dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_spec_files_recursive(&path, files)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && (ext == "json" || ext == "yaml" || ext == "yml" || ext == "toml")
        {
            // Skip the harness config file
            if path
                .file_name()
                .is_some_and(|f| f == HARNESS_CONFIG_FILENAME)
            {
                continue;
            }
            files.push(path);
        }
    }
    Ok(())
}
