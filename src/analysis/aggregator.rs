//! Coverage aggregation.
//!
//! Merges the data files of an aggregator's leaf modules, persists the
//! result as the aggregator's own data file and renders a report from it.

use super::planner::{AggregatePlan, AggregationPlanner};
use crate::coverage::{self, CoverageError, ProjectData};
use crate::report::{self, ReportRequest};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Failures that abort an aggregation pass.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error(transparent)]
    Load(CoverageError),

    #[error(transparent)]
    Save(CoverageError),
}

/// Merged coverage of several modules.
#[derive(Debug, Clone, Default)]
pub struct AggregateCoverageSet {
    /// The merged data.
    pub data: ProjectData,
    /// Data files merged into it, in merge order.
    pub inputs: Vec<PathBuf>,
}

/// Load every data file and fold them into one set, in order.
///
/// Stops at the first file that cannot be loaded; a partial aggregate
/// would understate coverage.
pub fn build_aggregate(
    data_files: &[PathBuf],
    show_progress: bool,
) -> Result<AggregateCoverageSet, AggregationError> {
    let progress = show_progress.then(|| {
        let pb = ProgressBar::new(data_files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} merging [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    });

    let mut aggregate = AggregateCoverageSet::default();
    for path in data_files {
        if let Some(ref pb) = progress {
            pb.set_message(path.display().to_string());
        }

        let data = coverage::load(path).map_err(AggregationError::Load)?;
        aggregate.data.merge(&data);
        aggregate.inputs.push(path.clone());

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    debug!(
        "Merged {} data files into {} packages",
        aggregate.inputs.len(),
        aggregate.data.packages.len()
    );
    Ok(aggregate)
}

/// Options of an aggregation pass.
#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Template for the per-root report request; paths are filled per root.
    pub report: ReportRequest,
    /// Show a progress bar while merging.
    pub show_progress: bool,
}

/// Result of aggregating one root.
#[derive(Debug, Clone)]
pub struct AggregatedRoot {
    pub root: String,
    pub data_file: PathBuf,
    pub output_dir: PathBuf,
    pub merged_modules: usize,
    pub reports_written: usize,
}

/// Aggregate every aggregator module of the reactor.
///
/// Roots without leaf data are skipped with a note. A data file that
/// cannot be loaded aborts the whole pass.
pub fn run_aggregation_pass(
    planner: &AggregationPlanner<'_>,
    options: &PassOptions,
) -> Result<Vec<AggregatedRoot>, AggregationError> {
    let reactor = planner.reactor();
    let mut results = Vec::new();

    for root in planner.aggregate_roots() {
        let root_module = reactor.get(root);

        if planner.leaf_descendants(root).is_empty() {
            debug!("Aggregator '{}' has no leaf modules", root_module.name);
            continue;
        }

        let Some(plan) = planner.plan_for_root(root) else {
            info!(
                "Not executing aggregate report for {} as no child coverage data files could be found",
                root_module.name
            );
            continue;
        };

        results.push(aggregate_root(planner, &plan, options)?);
    }

    Ok(results)
}

fn aggregate_root(
    planner: &AggregationPlanner<'_>,
    plan: &AggregatePlan,
    options: &PassOptions,
) -> Result<AggregatedRoot, AggregationError> {
    let reactor = planner.reactor();
    let root_module = reactor.get(plan.root);

    info!("Executing aggregate report for {}", root_module.name);
    for skipped in plan.skipped_leaves() {
        info!(
            "Module '{}' produced no coverage data, skipping it",
            reactor.get(skipped).name
        );
    }

    let aggregate = build_aggregate(&plan.input_paths(), options.show_progress)?;

    info!(
        "Saving aggregate coverage information in {}",
        plan.aggregate_data_file.display()
    );
    coverage::save(&aggregate.data, &plan.aggregate_data_file).map_err(AggregationError::Save)?;

    let request = ReportRequest {
        title: format!("{} (aggregate)", root_module.name),
        data_file: plan.aggregate_data_file.clone(),
        output_dir: plan.output_dir.clone(),
        source_roots: plan.source_roots.clone(),
        ..options.report.clone()
    };
    let reports_written = report::generate_reports(&request);

    Ok(AggregatedRoot {
        root: root_module.name.clone(),
        data_file: plan.aggregate_data_file.clone(),
        output_dir: plan.output_dir.clone(),
        merged_modules: aggregate.inputs.len(),
        reports_written,
    })
}
