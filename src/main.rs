//! covreactor - coverage aggregation for multi-module builds
//!
//! Runs the coverage reporting step of each module of a build reactor and
//! aggregates leaf-module coverage into one report per aggregator module.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad manifest, unreadable data file, failed aggregate, etc.)
//!   2 - Coverage check violations with halt-on-failure enabled

mod analysis;
mod check;
mod cli;
mod config;
mod coverage;
mod models;
mod reactor;
mod report;
mod scanner;

use analysis::{StepOptions, StepOutcome};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use cli::{Args, BuildArgs, CheckArgs, Command, DumpArgs, ReportArgs};
use config::{Config, CONFIG_FILE_NAME};
use models::ModuleDescriptor;
use reactor::Reactor;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(&args);

    info!("covreactor v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("covreactor failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the subcommand. Returns the exit code.
fn run(args: Args) -> Result<i32> {
    if let Command::InitConfig = args.command {
        return handle_init_config();
    }

    let mut config = load_config(&args)?;

    match &args.command {
        Command::Report(report_args) => run_report(report_args, &mut config, args.quiet),
        Command::Build(build_args) => run_build(build_args, &mut config, args.quiet),
        Command::Check(check_args) => run_check(check_args, &mut config),
        Command::Dump(dump_args) => run_dump(dump_args),
        Command::InitConfig => handle_init_config(),
    }
}

/// Handle `init-config`: generate a default .covreactor.toml.
fn handle_init_config() -> Result<i32> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        return Ok(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize data file locations, formats and thresholds.");
    Ok(0)
}

/// Run the reporting step of one module.
fn run_report(args: &ReportArgs, config: &mut Config, quiet: bool) -> Result<i32> {
    config.merge_with_aggregation_args(&args.aggregation);
    if config.general.skip {
        info!("Skipping coverage report");
        return Ok(0);
    }

    let reactor = load_reactor(&args.reactor, config)?;
    let module = find_module(&reactor, &args.reactor, &args.module)?;

    if args.aggregation.dry_run {
        print!(
            "{}",
            analysis::describe_step(&reactor, module.id, config.general.aggregate)
        );
        println!("\n✅ Dry run complete. Nothing was written.");
        return Ok(0);
    }

    let outcome = analysis::run_report_step(&reactor, module.id, &step_options(config, quiet))
        .with_context(|| format!("Coverage step of module '{}' failed", module.name))?;
    print_outcome(&module.name, &outcome);

    Ok(0)
}

/// Run the reporting step of every module, in build order.
fn run_build(args: &BuildArgs, config: &mut Config, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();

    config.merge_with_aggregation_args(&args.aggregation);
    if config.general.skip {
        info!("Skipping coverage reports");
        return Ok(0);
    }

    let reactor = load_reactor(&args.reactor, config)?;
    info!("Reactor has {} modules", reactor.len());
    if config.general.aggregate {
        if let Some(last) = reactor.last() {
            info!("Aggregate reports are produced by the step of '{}'", last.name);
        }
    }

    if args.aggregation.dry_run {
        for module in reactor.modules() {
            print!(
                "{}",
                analysis::describe_step(&reactor, module.id, config.general.aggregate)
            );
        }
        println!("\n✅ Dry run complete. Nothing was written.");
        return Ok(0);
    }

    let options = step_options(config, quiet);
    let mut aggregates = 0;
    for module in reactor.modules() {
        println!("📦 {}", module.name);
        let outcome = analysis::run_report_step(&reactor, module.id, &options)
            .with_context(|| format!("Coverage step of module '{}' failed", module.name))?;
        aggregates += outcome.aggregated.len();
        print_outcome(&module.name, &outcome);
    }

    println!(
        "\n✅ Build complete: {} modules, {} aggregate reports in {:.1}s",
        reactor.len(),
        aggregates,
        start_time.elapsed().as_secs_f64()
    );
    Ok(0)
}

/// Check a data file against the configured thresholds.
fn run_check(args: &CheckArgs, config: &mut Config) -> Result<i32> {
    config.merge_with_check_args(args);

    let reactor = match &args.reactor {
        Some(path) => Some(load_reactor(path, config)?),
        None => None,
    };
    let module = match (&reactor, &args.reactor, &args.module) {
        (Some(reactor), Some(path), Some(name)) => Some(find_module(reactor, path, name)?),
        _ => None,
    };

    let data_file = match (&args.data_file, module) {
        (Some(data_file), _) => data_file.clone(),
        (None, Some(module)) => module.settings.data_file.clone(),
        (None, None) => {
            return Err(anyhow!("Either --data-file or --reactor with --module is required"))
        }
    };

    let target = check::CheckTarget {
        data_file: &data_file,
        module,
    };
    let outcome = check::run_check(target, &config.general, &config.check)
        .with_context(|| format!("Coverage check of {} failed", data_file.display()))?;

    match &outcome {
        check::CheckOutcome::Passed => {
            println!("✅ All coverage checks passed for {}", data_file.display());
        }
        check::CheckOutcome::Failed {
            violations,
            halt: true,
        } => {
            eprintln!(
                "\n⛔ {} coverage check(s) failed. Failing (exit code 2).",
                violations.len()
            );
        }
        _ => {}
    }

    Ok(outcome.exit_code())
}

fn find_module<'a>(reactor: &'a Reactor, path: &Path, name: &str) -> Result<&'a ModuleDescriptor> {
    reactor.find(name).ok_or_else(|| {
        anyhow!(
            "Module '{}' is not part of the reactor {}",
            name,
            path.display()
        )
    })
}

/// Print a summary of a data file.
fn run_dump(args: &DumpArgs) -> Result<i32> {
    let data = coverage::load(&args.data_file)?;
    println!("{}", report::generate_dump(&data, Utc::now()));
    Ok(0)
}

fn step_options(config: &Config, quiet: bool) -> StepOptions {
    StepOptions {
        aggregate: config.general.aggregate,
        formats: config.general.formats.clone(),
        scan: scanner::ScanConfig::from(&config.scanner),
        show_progress: !quiet,
    }
}

fn load_reactor(path: &Path, config: &Config) -> Result<Reactor> {
    let reactor = Reactor::load(path, &config.general)
        .with_context(|| format!("Failed to load reactor manifest {}", path.display()))?;
    debug!("Loaded reactor with {} modules", reactor.len());
    Ok(reactor)
}

fn print_outcome(module: &str, outcome: &StepOutcome) {
    if outcome.simple_reports > 0 {
        println!("   📝 {}: {} report file(s)", module, outcome.simple_reports);
    }
    for aggregate in &outcome.aggregated {
        println!(
            "   🔗 {} (aggregate of {} modules): data {}, {} report file(s) in {}",
            aggregate.root,
            aggregate.merged_modules,
            aggregate.data_file.display(),
            aggregate.reports_written,
            aggregate.output_dir.display()
        );
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
