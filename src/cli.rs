//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::ClassThreshold;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// covreactor - coverage aggregation for multi-module builds
///
/// Runs the per-module coverage reporting step of a build reactor and,
/// once the last module has been built, merges the coverage data of every
/// aggregator's leaf modules into an aggregate report.
///
/// Examples:
///   covreactor report --reactor reactor.toml --module core
///   covreactor build --reactor reactor.toml --aggregate
///   covreactor check --data-file target/coverage/coverage.json --line-rate 80
///   covreactor dump --data-file target/coverage/coverage.json
///   covreactor init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .covreactor.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the reporting step for one module of the reactor
    Report(ReportArgs),

    /// Run the reporting step for every module, in build order
    Build(BuildArgs),

    /// Check a coverage data file against thresholds
    ///
    /// Exit code 2 when a threshold is violated and halting is enabled.
    Check(CheckArgs),

    /// Print a summary of a coverage data file
    Dump(DumpArgs),

    /// Generate a default .covreactor.toml configuration file
    InitConfig,
}

/// Options shared by the reporting commands.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct AggregationArgs {
    /// Generate aggregate reports for aggregator modules
    #[arg(long, env = "COVREACTOR_AGGREGATE")]
    pub aggregate: bool,

    /// Report formats to generate (comma-separated)
    ///
    /// Example: --format markdown,json
    #[arg(long, value_name = "FORMATS", value_delimiter = ',')]
    pub format: Option<Vec<ReportFormat>>,

    /// Print what would be reported and aggregated without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments of `report`.
#[derive(ClapArgs, Debug, Clone)]
pub struct ReportArgs {
    /// Reactor manifest listing the modules in build order
    #[arg(short, long, value_name = "FILE")]
    pub reactor: PathBuf,

    /// Name of the module whose reporting step runs now
    #[arg(short, long, value_name = "NAME")]
    pub module: String,

    #[command(flatten)]
    pub aggregation: AggregationArgs,
}

/// Arguments of `build`.
#[derive(ClapArgs, Debug, Clone)]
pub struct BuildArgs {
    /// Reactor manifest listing the modules in build order
    #[arg(short, long, value_name = "FILE")]
    pub reactor: PathBuf,

    #[command(flatten)]
    pub aggregation: AggregationArgs,
}

/// Arguments of `check`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CheckArgs {
    /// Coverage data file to check
    #[arg(long, value_name = "FILE", conflicts_with = "reactor")]
    pub data_file: Option<PathBuf>,

    /// Reactor manifest (with --module) to resolve the data file from
    #[arg(short, long, value_name = "FILE", requires = "module")]
    pub reactor: Option<PathBuf>,

    /// Module of the reactor to check
    #[arg(short, long, value_name = "NAME", requires = "reactor")]
    pub module: Option<String>,

    /// Minimum line rate per class, in percent
    #[arg(long, value_name = "PERCENT")]
    pub line_rate: Option<f64>,

    /// Minimum branch rate per class, in percent
    #[arg(long, value_name = "PERCENT")]
    pub branch_rate: Option<f64>,

    /// Minimum line rate per package, in percent
    #[arg(long, value_name = "PERCENT")]
    pub package_line_rate: Option<f64>,

    /// Minimum branch rate per package, in percent
    #[arg(long, value_name = "PERCENT")]
    pub package_branch_rate: Option<f64>,

    /// Minimum overall line rate, in percent
    #[arg(long, value_name = "PERCENT")]
    pub total_line_rate: Option<f64>,

    /// Minimum overall branch rate, in percent
    #[arg(long, value_name = "PERCENT")]
    pub total_branch_rate: Option<f64>,

    /// Per-class thresholds for matching classes, as PATTERN:BRANCH:LINE
    ///
    /// May be repeated; the first matching pattern wins.
    /// Example: --regex 'com\.acme\.gen\..*:0:20'
    #[arg(long = "regex", value_name = "PATTERN:BRANCH:LINE", value_parser = parse_class_threshold)]
    pub regexes: Vec<ClassThreshold>,

    /// Log violations instead of failing with exit code 2
    #[arg(long)]
    pub no_halt: bool,

    /// Run the check even on aggregator modules
    #[arg(long)]
    pub force: bool,
}

impl CheckArgs {
    fn thresholds(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("--line-rate", self.line_rate),
            ("--branch-rate", self.branch_rate),
            ("--package-line-rate", self.package_line_rate),
            ("--package-branch-rate", self.package_branch_rate),
            ("--total-line-rate", self.total_line_rate),
            ("--total-branch-rate", self.total_branch_rate),
        ]
    }
}

/// Arguments of `dump`.
#[derive(ClapArgs, Debug, Clone)]
pub struct DumpArgs {
    /// Coverage data file to summarize
    #[arg(long, value_name = "FILE")]
    pub data_file: PathBuf,
}

/// Output format for generated reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl ReportFormat {
    /// File name of the report inside the output directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "index.md",
            ReportFormat::Json => "coverage.json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Report(report) => validate_reactor_path(&report.reactor)?,
            Command::Build(build) => validate_reactor_path(&build.reactor)?,
            Command::Check(check) => {
                if check.data_file.is_none() && check.reactor.is_none() {
                    return Err("Either --data-file or --reactor with --module is required".to_string());
                }
                if let Some(ref reactor) = check.reactor {
                    validate_reactor_path(reactor)?;
                }
                for (flag, value) in check.thresholds() {
                    if let Some(value) = value {
                        if !(0.0..=100.0).contains(&value) {
                            return Err(format!("{} must be between 0 and 100", flag));
                        }
                    }
                }
                for regex in &check.regexes {
                    for value in [regex.branch_rate, regex.line_rate].into_iter().flatten() {
                        if !(0.0..=100.0).contains(&value) {
                            return Err(format!(
                                "--regex {}: rates must be between 0 and 100",
                                regex.pattern
                            ));
                        }
                    }
                }
            }
            Command::Dump(_) | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// Parse `PATTERN:BRANCH:LINE`. The pattern itself may contain `:`.
fn parse_class_threshold(value: &str) -> Result<ClassThreshold, String> {
    let mut parts = value.rsplitn(3, ':');
    let (Some(line), Some(branch), Some(pattern)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected PATTERN:BRANCH:LINE, got '{}'", value));
    };

    if pattern.is_empty() {
        return Err("pattern must not be empty".to_string());
    }

    let rate = |text: &str| {
        text.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid rate '{}': {}", text, e))
    };

    Ok(ClassThreshold {
        pattern: pattern.to_string(),
        branch_rate: Some(rate(branch)?),
        line_rate: Some(rate(line)?),
    })
}

fn validate_reactor_path(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("Reactor manifest does not exist: {}", path.display()));
    }
    if !path.is_file() {
        return Err(format!("Reactor manifest is not a file: {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            config: None,
            verbose: false,
            quiet: false,
            command,
        }
    }

    fn check_args() -> CheckArgs {
        CheckArgs {
            data_file: Some(PathBuf::from("coverage.json")),
            ..CheckArgs::default()
        }
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::InitConfig);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_reactor() {
        let args = make_args(Command::Build(BuildArgs {
            reactor: PathBuf::from("/definitely/not/here/reactor.toml"),
            aggregation: AggregationArgs::default(),
        }));
        let err = args.validate().unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_validation_threshold_range() {
        let mut check = check_args();
        check.total_line_rate = Some(120.0);
        let args = make_args(Command::Check(check));
        let err = args.validate().unwrap_err();
        assert!(err.contains("--total-line-rate"));

        let mut check = check_args();
        check.line_rate = Some(80.0);
        assert!(make_args(Command::Check(check)).validate().is_ok());
    }

    #[test]
    fn test_validation_check_needs_input() {
        let args = make_args(Command::Check(CheckArgs::default()));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_subcommand() {
        let args = Args::try_parse_from([
            "covreactor",
            "-v",
            "report",
            "--reactor",
            "reactor.toml",
            "--module",
            "core",
            "--aggregate",
            "--format",
            "markdown,json",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Command::Report(report) => {
                assert_eq!(report.module, "core");
                assert!(report.aggregation.aggregate);
                assert_eq!(
                    report.aggregation.format,
                    Some(vec![ReportFormat::Markdown, ReportFormat::Json])
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_class_threshold() {
        let threshold = parse_class_threshold("com\\.acme\\..*:40:60").unwrap();
        assert_eq!(threshold.pattern, "com\\.acme\\..*");
        assert_eq!(threshold.branch_rate, Some(40.0));
        assert_eq!(threshold.line_rate, Some(60.0));

        let with_colon = parse_class_threshold("a:b:10:20").unwrap();
        assert_eq!(with_colon.pattern, "a:b");

        assert!(parse_class_threshold("only:10").is_err());
        assert!(parse_class_threshold(":10:20").is_err());
        assert!(parse_class_threshold("p:x:20").is_err());
    }

    #[test]
    fn test_parse_repeated_regex_flags() {
        let args = Args::try_parse_from([
            "covreactor",
            "check",
            "--data-file",
            "coverage.json",
            "--regex",
            "gen\\..*:0:0",
            "--regex",
            ".*Test:50:50",
        ])
        .unwrap();

        match args.command {
            Command::Check(check) => {
                let patterns: Vec<&str> = check.regexes.iter().map(|r| r.pattern.as_str()).collect();
                assert_eq!(patterns, vec!["gen\\..*", ".*Test"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validation_regex_range() {
        let mut check = check_args();
        check.regexes.push(ClassThreshold {
            pattern: "p".to_string(),
            line_rate: Some(101.0),
            branch_rate: None,
        });
        let err = make_args(Command::Check(check)).validate().unwrap_err();
        assert!(err.contains("--regex p"));
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::InitConfig);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
