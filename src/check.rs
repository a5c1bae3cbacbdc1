//! Coverage threshold checks.

use crate::config::{CheckConfig, GeneralConfig};
use crate::coverage::{self, CoverageCounts, CoverageError, ProjectData};
use crate::models::ModuleDescriptor;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that stop a check before any rate is compared.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{name} must be between 0 and 100, got {value}")]
    OutOfRange { name: String, value: f64 },

    #[error("invalid class pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error(transparent)]
    Coverage(#[from] CoverageError),
}

/// Which level a threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckScope {
    Class,
    Package,
    Project,
}

/// Which rate is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Line,
    Branch,
}

/// A rate below its configured minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub scope: CheckScope,
    /// Class or package name; empty for the project.
    pub name: String,
    pub metric: Metric,
    /// Measured rate, in percent.
    pub actual: f64,
    /// Required rate, in percent.
    pub required: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = match self.scope {
            CheckScope::Class => format!("Class {}", self.name),
            CheckScope::Package => format!("Package {}", self.name),
            CheckScope::Project => "Project".to_string(),
        };
        let metric = match self.metric {
            Metric::Line => "line",
            Metric::Branch => "branch",
        };
        write!(
            f,
            "{} failed check: {} coverage rate of {:.1}% is below {:.1}%",
            subject, metric, self.actual, self.required
        )
    }
}

#[derive(Debug)]
struct ClassOverride {
    pattern: Regex,
    line_rate: Option<f64>,
    branch_rate: Option<f64>,
}

/// Validated thresholds, with class patterns compiled.
#[derive(Debug, Default)]
pub struct Thresholds {
    line_rate: Option<f64>,
    branch_rate: Option<f64>,
    package_line_rate: Option<f64>,
    package_branch_rate: Option<f64>,
    total_line_rate: Option<f64>,
    total_branch_rate: Option<f64>,
    overrides: Vec<ClassOverride>,
}

impl Thresholds {
    /// Validate `config` and compile its class patterns.
    ///
    /// Every rate must lie in `0..=100`, wherever it was configured.
    pub fn from_config(config: &CheckConfig) -> Result<Self, CheckError> {
        let named = [
            ("line_rate", config.line_rate),
            ("branch_rate", config.branch_rate),
            ("package_line_rate", config.package_line_rate),
            ("package_branch_rate", config.package_branch_rate),
            ("total_line_rate", config.total_line_rate),
            ("total_branch_rate", config.total_branch_rate),
        ];
        for (name, value) in named {
            ensure_percent(name, value)?;
        }

        let mut overrides = Vec::with_capacity(config.regexes.len());
        for entry in &config.regexes {
            ensure_percent(&format!("line_rate of '{}'", entry.pattern), entry.line_rate)?;
            ensure_percent(&format!("branch_rate of '{}'", entry.pattern), entry.branch_rate)?;

            let pattern = Regex::new(&entry.pattern).map_err(|source| CheckError::InvalidPattern {
                pattern: entry.pattern.clone(),
                source,
            })?;
            overrides.push(ClassOverride {
                pattern,
                line_rate: entry.line_rate,
                branch_rate: entry.branch_rate,
            });
        }

        Ok(Self {
            line_rate: config.line_rate,
            branch_rate: config.branch_rate,
            package_line_rate: config.package_line_rate,
            package_branch_rate: config.package_branch_rate,
            total_line_rate: config.total_line_rate,
            total_branch_rate: config.total_branch_rate,
            overrides,
        })
    }

    /// Returns true if no threshold is configured.
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
            && [
                self.line_rate,
                self.branch_rate,
                self.package_line_rate,
                self.package_branch_rate,
                self.total_line_rate,
                self.total_branch_rate,
            ]
            .iter()
            .all(Option::is_none)
    }

    /// Line and branch minimums of one class. The first matching pattern
    /// wins; a rate it leaves unset falls back to the class default.
    fn for_class(&self, class_name: &str) -> (Option<f64>, Option<f64>) {
        match self.overrides.iter().find(|o| o.pattern.is_match(class_name)) {
            Some(o) => (
                o.line_rate.or(self.line_rate),
                o.branch_rate.or(self.branch_rate),
            ),
            None => (self.line_rate, self.branch_rate),
        }
    }
}

fn ensure_percent(name: &str, value: Option<f64>) -> Result<(), CheckError> {
    match value {
        Some(value) if !(0.0..=100.0).contains(&value) => Err(CheckError::OutOfRange {
            name: name.to_string(),
            value,
        }),
        _ => Ok(()),
    }
}

/// Check `data` against every configured threshold.
pub fn check(data: &ProjectData, thresholds: &Thresholds) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (package_name, package) in &data.packages {
        for (class_name, class) in &package.classes {
            let (line_min, branch_min) = thresholds.for_class(class_name);
            evaluate(
                &mut violations,
                CheckScope::Class,
                class_name,
                class.counts(),
                line_min,
                branch_min,
            );
        }
        evaluate(
            &mut violations,
            CheckScope::Package,
            package_name,
            package.counts(),
            thresholds.package_line_rate,
            thresholds.package_branch_rate,
        );
    }

    evaluate(
        &mut violations,
        CheckScope::Project,
        "",
        data.counts(),
        thresholds.total_line_rate,
        thresholds.total_branch_rate,
    );

    violations
}

fn evaluate(
    violations: &mut Vec<Violation>,
    scope: CheckScope,
    name: &str,
    counts: CoverageCounts,
    line_min: Option<f64>,
    branch_min: Option<f64>,
) {
    let checks = [
        (Metric::Line, counts.line_rate(), line_min),
        (Metric::Branch, counts.branch_rate(), branch_min),
    ];

    for (metric, rate, minimum) in checks {
        let Some(required) = minimum else { continue };
        let actual = rate * 100.0;
        if actual < required {
            violations.push(Violation {
                scope,
                name: name.to_string(),
                metric,
                actual,
                required,
            });
        }
    }
}

/// What a check is run on.
#[derive(Debug, Clone, Copy)]
pub struct CheckTarget<'a> {
    /// Data file to check.
    pub data_file: &'a Path,
    /// Reactor module the data file belongs to, when known.
    pub module: Option<&'a ModuleDescriptor>,
}

/// Result of a check run.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Skipped by configuration, for an aggregator, or for lack of thresholds.
    Skipped,
    /// The data file does not exist; nothing was instrumented.
    NoData(PathBuf),
    /// Every threshold was met.
    Passed,
    /// Thresholds were violated.
    Failed { violations: Vec<Violation>, halt: bool },
}

impl CheckOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckOutcome::Failed { halt: true, .. } => 2,
            _ => 0,
        }
    }
}

/// Run a check on `target` with the given settings.
///
/// Violations are logged as errors. A missing data file is not an error.
pub fn run_check(
    target: CheckTarget<'_>,
    general: &GeneralConfig,
    config: &CheckConfig,
) -> Result<CheckOutcome, CheckError> {
    if general.skip {
        info!("Skipping coverage check");
        return Ok(CheckOutcome::Skipped);
    }

    if let Some(module) = target.module {
        if module.is_aggregator() && !general.force {
            info!(
                "Not executing coverage check on aggregator module '{}' (use --force to check it)",
                module.name
            );
            return Ok(CheckOutcome::Skipped);
        }
    }

    let thresholds = Thresholds::from_config(config)?;
    if thresholds.is_empty() {
        warn!("No coverage thresholds configured; nothing to check");
        return Ok(CheckOutcome::Skipped);
    }

    if !target.data_file.is_file() {
        info!(
            "Cannot perform check, no coverage data file at {} - skipping",
            target.data_file.display()
        );
        return Ok(CheckOutcome::NoData(target.data_file.to_path_buf()));
    }

    let data = coverage::load(target.data_file)?;
    let violations = check(&data, &thresholds);
    if violations.is_empty() {
        return Ok(CheckOutcome::Passed);
    }

    for violation in &violations {
        error!("{}", violation);
    }

    Ok(CheckOutcome::Failed {
        violations,
        halt: config.halt_on_failure,
    })
}
