//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.covreactor.toml` files.

use crate::cli::{AggregationArgs, CheckArgs, ReportFormat};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".covreactor.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Coverage check thresholds.
    #[serde(default)]
    pub check: CheckConfig,

    /// Source scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// General reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Generate aggregate reports in multi-module reactors.
    #[serde(default)]
    pub aggregate: bool,

    /// Data file location, relative to each module's base directory
    /// unless absolute.
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Report output directory, relative to each module's base directory
    /// unless absolute.
    #[serde(default = "default_output_directory")]
    pub output_directory: String,

    /// Report formats to generate.
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,

    /// Skip every coverage step.
    #[serde(default)]
    pub skip: bool,

    /// Run checks on aggregator modules too.
    #[serde(default)]
    pub force: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            aggregate: false,
            data_file: default_data_file(),
            output_directory: default_output_directory(),
            formats: default_formats(),
            skip: false,
            force: false,
        }
    }
}

fn default_data_file() -> String {
    "target/coverage/coverage.json".to_string()
}

fn default_output_directory() -> String {
    "target/site/coverage".to_string()
}

fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Markdown]
}

/// Coverage thresholds, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Minimum line rate of every class.
    #[serde(default)]
    pub line_rate: Option<f64>,

    /// Minimum branch rate of every class.
    #[serde(default)]
    pub branch_rate: Option<f64>,

    /// Minimum line rate of every package.
    #[serde(default)]
    pub package_line_rate: Option<f64>,

    /// Minimum branch rate of every package.
    #[serde(default)]
    pub package_branch_rate: Option<f64>,

    /// Minimum overall line rate.
    #[serde(default)]
    pub total_line_rate: Option<f64>,

    /// Minimum overall branch rate.
    #[serde(default)]
    pub total_branch_rate: Option<f64>,

    /// Fail (exit code 2) on violations instead of only logging them.
    #[serde(default = "default_true")]
    pub halt_on_failure: bool,

    /// Per-class thresholds for classes matching a pattern. The first
    /// matching entry replaces `line_rate`/`branch_rate` for that class.
    #[serde(default, rename = "regex")]
    pub regexes: Vec<ClassThreshold>,
}

/// Thresholds for the classes whose name matches `pattern`.
///
/// ```toml
/// [[check.regex]]
/// pattern = "com\\.acme\\.generated\\..*"
/// line_rate = 0.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassThreshold {
    /// Regular expression matched against the fully qualified class name.
    pub pattern: String,

    /// Minimum line rate of matching classes.
    #[serde(default)]
    pub line_rate: Option<f64>,

    /// Minimum branch rate of matching classes.
    #[serde(default)]
    pub branch_rate: Option<f64>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            line_rate: None,
            branch_rate: None,
            package_line_rate: None,
            package_branch_rate: None,
            total_line_rate: None,
            total_branch_rate: None,
            halt_on_failure: true,
            regexes: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Source scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Source file extensions to index.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names to skip.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excludes: default_excludes(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["java", "groovy", "kt", "scala"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_excludes() -> Vec<String> {
    vec![".git", "target", "build", "node_modules", ".idea", ".vscode"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge reporting options from the command line.
    ///
    /// Flags only switch things on; values only override when given.
    pub fn merge_with_aggregation_args(&mut self, args: &AggregationArgs) {
        if args.aggregate {
            self.general.aggregate = true;
        }
        if let Some(ref formats) = args.format {
            self.general.formats = formats.clone();
        }
    }

    /// Merge check thresholds from the command line.
    pub fn merge_with_check_args(&mut self, args: &CheckArgs) {
        let overrides = [
            (&mut self.check.line_rate, args.line_rate),
            (&mut self.check.branch_rate, args.branch_rate),
            (&mut self.check.package_line_rate, args.package_line_rate),
            (&mut self.check.package_branch_rate, args.package_branch_rate),
            (&mut self.check.total_line_rate, args.total_line_rate),
            (&mut self.check.total_branch_rate, args.total_branch_rate),
        ];
        for (slot, value) in overrides {
            if value.is_some() {
                *slot = value;
            }
        }

        if !args.regexes.is_empty() {
            let mut regexes = args.regexes.clone();
            regexes.append(&mut self.check.regexes);
            self.check.regexes = regexes;
        }

        if args.no_halt {
            self.check.halt_on_failure = false;
        }
        if args.force {
            self.general.force = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
