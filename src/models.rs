//! Data models for the reactor.
//!
//! This module contains the module descriptors handed to the planner,
//! the per-module settings resolved from configuration, and the report
//! structures rendered from coverage data.

use crate::coverage::CoverageCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable identity of a module inside one reactor.
///
/// Two descriptors are the same module iff their ids are equal; the
/// descriptor contents are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub usize);

/// Packaging of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingKind {
    /// Grouping node with no code or coverage of its own ("pom").
    Aggregator,
    /// Buildable module that may produce coverage data.
    Leaf,
}

impl PackagingKind {
    /// Maps a build packaging name onto a kind. Only `pom` aggregates.
    pub fn from_packaging(packaging: &str) -> Self {
        if packaging.trim().eq_ignore_ascii_case("pom") {
            PackagingKind::Aggregator
        } else {
            PackagingKind::Leaf
        }
    }
}

impl fmt::Display for PackagingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackagingKind::Aggregator => write!(f, "aggregator"),
            PackagingKind::Leaf => write!(f, "leaf"),
        }
    }
}

/// One module of the reactor.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Arena index of this module.
    pub id: ModuleId,
    /// Display name, unique within the reactor.
    pub name: String,
    /// Absolute module root directory.
    pub base_dir: PathBuf,
    /// Aggregator or leaf.
    pub packaging: PackagingKind,
    /// Logical parent inside the reactor. `None` for roots and for modules
    /// whose parent lives outside the build.
    pub parent: Option<ModuleId>,
    /// Configured paths for this module.
    pub settings: ModuleSettings,
}

impl ModuleDescriptor {
    /// Returns true if this module is an aggregator.
    pub fn is_aggregator(&self) -> bool {
        self.packaging == PackagingKind::Aggregator
    }
}

/// Absolute paths configured for a single module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSettings {
    /// Where this module's coverage data file is (or will be) written.
    pub data_file: PathBuf,
    /// Where this module's report is written.
    pub output_directory: PathBuf,
    /// Compile source roots, used to resolve class sources in reports.
    pub source_roots: Vec<PathBuf>,
}

/// Coverage rates with the counters they derive from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    /// Fraction of lines covered (0.0 - 1.0).
    pub line_rate: f64,
    /// Fraction of branches covered (0.0 - 1.0).
    pub branch_rate: f64,
    /// Raw counters.
    pub counts: CoverageCounts,
}

impl From<CoverageCounts> for RateSummary {
    fn from(counts: CoverageCounts) -> Self {
        Self {
            line_rate: counts.line_rate(),
            branch_rate: counts.branch_rate(),
            counts,
        }
    }
}

/// Report entry for one class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassReport {
    /// Fully qualified class name.
    pub name: String,
    /// Source file as recorded in the data file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Source file found under the source roots, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_source: Option<String>,
    /// Coverage of the class.
    pub summary: RateSummary,
}

/// Report entry for one package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    /// Package name.
    pub name: String,
    /// Coverage of the package.
    pub summary: RateSummary,
    /// Classes of the package, by name.
    pub classes: Vec<ClassReport>,
}

/// Metadata about a coverage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report title, usually the module name.
    pub title: String,
    /// Data file the report was rendered from.
    pub data_file: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of packages.
    pub package_count: usize,
    /// Number of classes.
    pub class_count: usize,
}

/// A complete coverage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Metadata about the report.
    pub metadata: ReportMetadata,
    /// Project-wide coverage.
    pub totals: RateSummary,
    /// Per-package breakdown.
    pub packages: Vec<PackageReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packaging_from_name() {
        assert_eq!(PackagingKind::from_packaging("pom"), PackagingKind::Aggregator);
        assert_eq!(PackagingKind::from_packaging(" POM "), PackagingKind::Aggregator);
        assert_eq!(PackagingKind::from_packaging("jar"), PackagingKind::Leaf);
        assert_eq!(PackagingKind::from_packaging("war"), PackagingKind::Leaf);
    }

    #[test]
    fn test_rate_summary_from_counts() {
        let summary = RateSummary::from(CoverageCounts {
            valid_lines: 4,
            covered_lines: 3,
            valid_branches: 0,
            covered_branches: 0,
        });
        assert!((summary.line_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(summary.branch_rate, 1.0);
    }
}
