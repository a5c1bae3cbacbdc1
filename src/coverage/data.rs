//! Coverage data: packages of classes of instrumented lines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Branch coverage recorded on a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchData {
    /// Branches taken at least once.
    pub covered: u32,
    /// Branches present on the line.
    pub total: u32,
}

impl BranchData {
    /// Caps `covered` at `total`.
    fn clamped(self) -> Self {
        BranchData {
            covered: self.covered.min(self.total),
            total: self.total,
        }
    }
}

/// One instrumented line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineData {
    /// Execution count.
    pub hits: u64,
    /// Branch information when the line is a conditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchData>,
}

impl LineData {
    fn merge(&mut self, other: &LineData) {
        self.hits = self.hits.saturating_add(other.hits);
        // Both sides are clamped first so the max below stays associative.
        let ours = self.branch.map(BranchData::clamped);
        let theirs = other.branch.map(BranchData::clamped);
        self.branch = match (ours, theirs) {
            (Some(a), Some(b)) => Some(BranchData {
                covered: a.covered.max(b.covered),
                total: a.total.max(b.total),
            }),
            (a, b) => a.or(b),
        };
    }
}

/// Coverage of a single class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassData {
    /// Source file relative to a source root, e.g. `com/acme/Circle.java`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Instrumented lines keyed by line number.
    #[serde(default)]
    pub lines: BTreeMap<u32, LineData>,
}

impl ClassData {
    /// Merge another class's data into this one.
    pub fn merge(&mut self, other: &ClassData) {
        if self.source_file.is_none() {
            self.source_file = other.source_file.clone();
        }
        for (number, line) in &other.lines {
            self.lines.entry(*number).or_default().merge(line);
        }
    }

    /// Line and branch counters for this class.
    pub fn counts(&self) -> CoverageCounts {
        let mut counts = CoverageCounts::default();
        for line in self.lines.values() {
            counts.valid_lines += 1;
            if line.hits > 0 {
                counts.covered_lines += 1;
            }
            if let Some(branch) = line.branch {
                counts.valid_branches += u64::from(branch.total);
                counts.covered_branches += u64::from(branch.covered.min(branch.total));
            }
        }
        counts
    }
}

/// Coverage of a package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageData {
    /// Classes keyed by fully qualified name.
    #[serde(default)]
    pub classes: BTreeMap<String, ClassData>,
}

impl PackageData {
    /// Merge another package's data into this one.
    pub fn merge(&mut self, other: &PackageData) {
        for (name, class) in &other.classes {
            self.classes.entry(name.clone()).or_default().merge(class);
        }
    }

    /// Line and branch counters summed over all classes.
    pub fn counts(&self) -> CoverageCounts {
        self.classes
            .values()
            .map(ClassData::counts)
            .fold(CoverageCounts::default(), CoverageCounts::add)
    }
}

/// Coverage of a whole project (one module, or an aggregate of many).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectData {
    /// Packages keyed by name.
    #[serde(default)]
    pub packages: BTreeMap<String, PackageData>,
}

impl ProjectData {
    /// Union `other` into `self`.
    ///
    /// A line is covered in the result iff it is covered in either input.
    /// The operation is associative and commutative.
    pub fn merge(&mut self, other: &ProjectData) {
        for (name, package) in &other.packages {
            self.packages.entry(name.clone()).or_default().merge(package);
        }
    }

    /// Line and branch counters summed over all packages.
    pub fn counts(&self) -> CoverageCounts {
        self.packages
            .values()
            .map(PackageData::counts)
            .fold(CoverageCounts::default(), CoverageCounts::add)
    }

    /// Number of classes across all packages.
    pub fn class_count(&self) -> usize {
        self.packages.values().map(|p| p.classes.len()).sum()
    }
}

/// Raw coverage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageCounts {
    pub valid_lines: u64,
    pub covered_lines: u64,
    pub valid_branches: u64,
    pub covered_branches: u64,
}

impl CoverageCounts {
    fn add(self, other: CoverageCounts) -> CoverageCounts {
        CoverageCounts {
            valid_lines: self.valid_lines + other.valid_lines,
            covered_lines: self.covered_lines + other.covered_lines,
            valid_branches: self.valid_branches + other.valid_branches,
            covered_branches: self.covered_branches + other.covered_branches,
        }
    }

    /// Fraction of lines covered, `1.0` when there are no lines.
    pub fn line_rate(&self) -> f64 {
        ratio(self.covered_lines, self.valid_lines)
    }

    /// Fraction of branches covered, `1.0` when there are no branches.
    pub fn branch_rate(&self) -> f64 {
        ratio(self.covered_branches, self.valid_branches)
    }
}

fn ratio(covered: u64, valid: u64) -> f64 {
    if valid == 0 {
        1.0
    } else {
        covered as f64 / valid as f64
    }
}
