//! The per-module reporting step.
//!
//! Each module of the reactor runs this step once, in build order. It
//! renders the module's own report when the module has data, and on the
//! last module of the build it aggregates every aggregator's subtree.

use super::aggregator::{run_aggregation_pass, AggregatedRoot, AggregationError, PassOptions};
use super::planner::AggregationPlanner;
use crate::cli::ReportFormat;
use crate::models::ModuleId;
use crate::reactor::Reactor;
use crate::report::{self, ReportRequest};
use crate::scanner::ScanConfig;
use std::fmt::Write as _;
use tracing::info;

/// Settings of a reporting step.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    /// Aggregate reports were requested.
    pub aggregate: bool,
    /// Report formats.
    pub formats: Vec<ReportFormat>,
    /// Source scanning settings.
    pub scan: ScanConfig,
    /// Show a progress bar while merging.
    pub show_progress: bool,
}

/// What a step produced.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Number of per-module report files written.
    pub simple_reports: usize,
    /// Aggregates produced.
    pub aggregated: Vec<AggregatedRoot>,
}

/// Run the reporting step of `current`.
///
/// Only an unreadable data file met while aggregating is an error; the
/// module's own report has already been written by then.
pub fn run_report_step(
    reactor: &Reactor,
    current: ModuleId,
    options: &StepOptions,
) -> Result<StepOutcome, AggregationError> {
    let planner = AggregationPlanner::new(reactor, current, options.aggregate);
    let module = planner.current();
    let mut outcome = StepOutcome::default();

    if !planner.can_generate_report() {
        info!(
            "Not executing report for {} as the coverage data file ({}) could not be found",
            module.name,
            module.settings.data_file.display()
        );
        return Ok(outcome);
    }

    if planner.can_generate_simple_report() {
        let request = ReportRequest {
            title: module.name.clone(),
            data_file: module.settings.data_file.clone(),
            output_dir: module.settings.output_directory.clone(),
            source_roots: module.settings.source_roots.clone(),
            formats: options.formats.clone(),
            scan: options.scan.clone(),
        };
        outcome.simple_reports = report::generate_reports(&request);
    }

    if planner.can_generate_aggregate_report() {
        let pass = PassOptions {
            report: ReportRequest {
                formats: options.formats.clone(),
                scan: options.scan.clone(),
                ..ReportRequest::default()
            },
            show_progress: options.show_progress,
        };
        outcome.aggregated = run_aggregation_pass(&planner, &pass)?;
    }

    Ok(outcome)
}

/// Describe what the step of `current` would do, without writing anything.
pub fn describe_step(reactor: &Reactor, current: ModuleId, aggregate: bool) -> String {
    let planner = AggregationPlanner::new(reactor, current, aggregate);
    let module = planner.current();
    let mut out = String::new();

    let _ = writeln!(out, "Module {} ({})", module.name, module.packaging);
    let _ = writeln!(
        out,
        "  own data file: {} ({})",
        module.settings.data_file.display(),
        if planner.can_generate_simple_report() { "found" } else { "missing" }
    );

    if !aggregate {
        let _ = writeln!(out, "  aggregation not requested");
        return out;
    }

    if module.is_aggregator() {
        let _ = writeln!(
            out,
            "  leaf data under this module: {}",
            if planner.can_aggregate_now() { "yes" } else { "no" }
        );
    }

    if !planner.can_generate_aggregate_report() {
        let _ = writeln!(out, "  no aggregation during this step");
        return out;
    }

    let layout = planner.layout();
    let _ = writeln!(out, "  relative data file: {}", layout.relative_data_file);
    let _ = writeln!(
        out,
        "  relative aggregate output dir: {}",
        layout.relative_aggregate_output_dir
    );

    for root in planner.aggregate_roots() {
        let root_module = reactor.get(root);
        match planner.plan_for_root(root) {
            Some(plan) => {
                let _ = writeln!(
                    out,
                    "  aggregate {} -> {}",
                    root_module.name,
                    plan.aggregate_data_file.display()
                );
                for (leaf, path) in &plan.data_files {
                    let _ = writeln!(out, "    + {} ({})", reactor.get(*leaf).name, path.display());
                }
                for leaf in plan.skipped_leaves() {
                    let _ = writeln!(out, "    - {} (no data)", reactor.get(leaf).name);
                }
            }
            None => {
                let _ = writeln!(out, "  skip {}: no leaf data", root_module.name);
            }
        }
    }

    out
}
