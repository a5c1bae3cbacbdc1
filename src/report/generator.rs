//! Coverage report generation.
//!
//! This module turns a coverage data file into Markdown and JSON reports.

use crate::cli::ReportFormat;
use crate::coverage::ProjectData;
use crate::models::{ClassReport, CoverageReport, PackageReport, RateSummary, ReportMetadata};
use crate::scanner::SourceIndex;
use anyhow::Result;
use chrono::Utc;
use std::path::Path;

/// Build the report structure for one data file.
pub fn build_report(
    title: &str,
    data_file: &Path,
    data: &ProjectData,
    sources: &SourceIndex,
) -> CoverageReport {
    let packages: Vec<PackageReport> = data
        .packages
        .iter()
        .map(|(name, package)| PackageReport {
            name: name.clone(),
            summary: RateSummary::from(package.counts()),
            classes: package
                .classes
                .iter()
                .map(|(class_name, class)| ClassReport {
                    name: class_name.clone(),
                    source_file: class.source_file.clone(),
                    resolved_source: class
                        .source_file
                        .as_deref()
                        .and_then(|file| sources.resolve(file))
                        .map(|path| path.display().to_string()),
                    summary: RateSummary::from(class.counts()),
                })
                .collect(),
        })
        .collect();

    CoverageReport {
        metadata: ReportMetadata {
            title: title.to_string(),
            data_file: data_file.display().to_string(),
            generated_at: Utc::now(),
            package_count: packages.len(),
            class_count: data.class_count(),
        },
        totals: RateSummary::from(data.counts()),
        packages,
    }
}

/// Render the report in the requested format.
pub fn render(report: &CoverageReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Markdown => Ok(generate_markdown_report(report)),
        ReportFormat::Json => generate_json_report(report),
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &CoverageReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Coverage Report: {}\n\n", report.metadata.title));
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.totals));
    output.push_str(&generate_packages_section(&report.packages));
    output.push_str(&generate_classes_section(&report.packages));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Data File:** `{}`\n", metadata.data_file));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Packages:** {}\n", metadata.package_count));
    section.push_str(&format!("- **Classes:** {}\n", metadata.class_count));
    section.push('\n');

    section
}

fn generate_summary_section(totals: &RateSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Line Coverage | Branch Coverage | Lines | Branches |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {}/{} | {}/{} |\n\n",
        percent(totals.line_rate),
        percent(totals.branch_rate),
        totals.counts.covered_lines,
        totals.counts.valid_lines,
        totals.counts.covered_branches,
        totals.counts.valid_branches,
    ));

    section
}

fn generate_packages_section(packages: &[PackageReport]) -> String {
    let mut section = String::new();

    section.push_str("## Packages\n\n");
    if packages.is_empty() {
        section.push_str("No coverage data was recorded.\n\n");
        return section;
    }

    section.push_str("| Package | Classes | Line Coverage | Branch Coverage |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for package in packages {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            package.name,
            package.classes.len(),
            percent(package.summary.line_rate),
            percent(package.summary.branch_rate),
        ));
    }
    section.push('\n');

    section
}

fn generate_classes_section(packages: &[PackageReport]) -> String {
    let mut section = String::new();

    for package in packages.iter().filter(|p| !p.classes.is_empty()) {
        section.push_str(&format!("### {}\n\n", package.name));
        section.push_str("| Class | Source | Line Coverage | Branch Coverage |\n");
        section.push_str("|:---|:---|:---:|:---:|\n");

        for class in &package.classes {
            let source = match (&class.resolved_source, &class.source_file) {
                (Some(resolved), _) => format!("`{}`", resolved),
                (None, Some(recorded)) => format!("{} (not found)", recorded),
                (None, None) => "-".to_string(),
            };
            section.push_str(&format!(
                "| `{}` | {} | {} | {} |\n",
                class.name,
                source,
                percent(class.summary.line_rate),
                percent(class.summary.branch_rate),
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by covreactor*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &CoverageReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Format a rate as a whole percentage.
pub fn percent(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}
