//! Report rendering.
//!
//! [`generate_reports`] is the single entry point used for both per-module
//! and aggregate reports: it reads one data file and writes one file per
//! requested format into the output directory.

pub mod dump;
pub mod generator;

pub use dump::generate_dump;
pub use generator::{build_report, render};

use crate::cli::ReportFormat;
use crate::coverage;
use crate::scanner::{ScanConfig, SourceIndex};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Inputs of one report generation.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    /// Report title.
    pub title: String,
    /// Data file to render.
    pub data_file: PathBuf,
    /// Directory receiving the report files.
    pub output_dir: PathBuf,
    /// Source roots used to resolve class sources.
    pub source_roots: Vec<PathBuf>,
    /// Formats to write.
    pub formats: Vec<ReportFormat>,
    /// Source scanning settings.
    pub scan: ScanConfig,
}

/// Generate every requested format. Returns how many files were written.
///
/// Failures are logged and never propagated, so a broken report does not
/// fail the build.
pub fn generate_reports(request: &ReportRequest) -> usize {
    let data = match coverage::load(&request.data_file) {
        Ok(data) => data,
        Err(e) => {
            error!("Error in coverage report generation: {:#}", anyhow::Error::new(e));
            return 0;
        }
    };

    let sources = SourceIndex::build(&request.source_roots, &request.scan);
    if sources.is_empty() {
        debug!("No source files found for {}", request.title);
    } else {
        debug!("Indexed {} source files for {}", sources.len(), request.title);
    }
    let report = build_report(&request.title, &request.data_file, &data, &sources);

    let mut written = 0;
    for format in &request.formats {
        match write_report(&request.output_dir, *format, &report) {
            Ok(path) => {
                info!("Coverage report written to {}", path.display());
                written += 1;
            }
            Err(e) => error!("Error in coverage report generation: {:#}", e),
        }
    }

    written
}

fn write_report(
    output_dir: &Path,
    format: ReportFormat,
    report: &crate::models::CoverageReport,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let path = output_dir.join(format.file_name());
    let content = render(report, format)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{ClassData, LineData, ProjectData};
    use tempfile::TempDir;

    #[test]
    fn test_generate_reports_writes_each_format() {
        let dir = TempDir::new().unwrap();
        let data_file = dir.path().join("coverage.json");
        let mut data = ProjectData::default();
        let mut class = ClassData::default();
        class.lines.insert(1, LineData { hits: 1, branch: None });
        data.packages
            .entry("p".to_string())
            .or_default()
            .classes
            .insert("p.A".to_string(), class);
        coverage::save(&data, &data_file).unwrap();

        let request = ReportRequest {
            title: "core".to_string(),
            data_file,
            output_dir: dir.path().join("site"),
            formats: vec![ReportFormat::Markdown, ReportFormat::Json],
            ..ReportRequest::default()
        };

        assert_eq!(generate_reports(&request), 2);
        assert!(dir.path().join("site/index.md").is_file());
        assert!(dir.path().join("site/coverage.json").is_file());
    }

    #[test]
    fn test_generate_reports_missing_data_is_logged() {
        let dir = TempDir::new().unwrap();
        let request = ReportRequest {
            title: "core".to_string(),
            data_file: dir.path().join("missing.json"),
            output_dir: dir.path().join("site"),
            formats: vec![ReportFormat::Markdown],
            ..ReportRequest::default()
        };

        assert_eq!(generate_reports(&request), 0);
        assert!(!dir.path().join("site").exists());
    }
}
