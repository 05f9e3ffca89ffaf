//! `augsnap` command line runner.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use augsnap::augmentations::AugmentationRegistry;
use augsnap::config::{HarnessConfig, LogLevel};
use augsnap::error::{HarnessError, Result};
use augsnap::harness::{Harness, RunReport};
use augsnap::sample::Sample;
use augsnap::snapshot::SnapshotMode;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

fn cli() -> Command {
    Command::new("augsnap")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Deterministic augmentation snapshot runner")
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List registered augmentations"))
        .subcommand(
            Command::new("run")
                .about("Run snapshot and equivalence checks")
                .arg(
                    Arg::new("update")
                        .long("update")
                        .action(ArgAction::SetTrue)
                        .help("Record new snapshots instead of verifying"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("YAML configuration file"),
                )
                .arg(
                    Arg::new("fixtures")
                        .long("fixtures")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory of <Name>.yml option fixtures"),
                )
                .arg(
                    Arg::new("snapshots")
                        .long("snapshots")
                        .value_parser(value_parser!(PathBuf))
                        .help("Snapshot directory"),
                )
                .arg(
                    Arg::new("work-dir")
                        .long("work-dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Scratch directory for produced files"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for every augmentation"),
                )
                .arg(
                    Arg::new("image-ext")
                        .long("image-ext")
                        .value_parser(["jpg", "png"])
                        .help("Image format of written files"),
                )
                .arg(
                    Arg::new("log-level")
                        .long("log-level")
                        .value_parser(["error", "warn", "info", "debug", "trace"])
                        .help("Logging verbosity"),
                )
                .arg(
                    Arg::new("sample-image")
                        .long("sample-image")
                        .value_parser(value_parser!(PathBuf))
                        .requires("sample-annotations")
                        .help("Use this image instead of the generated sample"),
                )
                .arg(
                    Arg::new("sample-annotations")
                        .long("sample-annotations")
                        .value_parser(value_parser!(PathBuf))
                        .requires("sample-image")
                        .help("Normalized four-corner CSV for --sample-image"),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the JSON run report to this file"),
                )
                .arg(
                    Arg::new("names")
                        .num_args(0..)
                        .help("Augmentations to run (default: all)"),
                ),
        )
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("list", _)) => {
            init_logging(LogLevel::default());
            list();
            ExitCode::SUCCESS
        }
        Some(("run", args)) => match run(args) {
            Ok(report) if report.is_success() => ExitCode::SUCCESS,
            Ok(_) => ExitCode::FAILURE,
            Err(e) => {
                // Config errors happen before the configured logger exists.
                init_logging(LogLevel::default());
                log::error!("{}", e);
                ExitCode::FAILURE
            }
        },
        _ => ExitCode::FAILURE,
    }
}

/// Install the logger. Later calls keep the first logger.
fn init_logging(level: LogLevel) {
    let _ = env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .parse_default_env()
        .try_init();
}

fn list() {
    for entry in AugmentationRegistry::new().all() {
        println!("{:<16} {}", entry.name, entry.kind.name());
    }
}

/// Configuration file, then environment, then flags.
fn load_config(args: &ArgMatches) -> Result<HarnessConfig> {
    let mut config =
        HarnessConfig::load_or_default(args.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    config.apply_env();

    if args.get_flag("update") {
        config.mode = SnapshotMode::Update;
    }
    if let Some(dir) = args.get_one::<PathBuf>("fixtures") {
        config.fixtures_dir = dir.clone();
    }
    if let Some(dir) = args.get_one::<PathBuf>("snapshots") {
        config.snapshots_dir = dir.clone();
    }
    if let Some(seed) = args.get_one::<u64>("seed") {
        config.seed = *seed;
    }
    if let Some(ext) = args.get_one::<String>("image-ext") {
        config.set_image_extension(ext)?;
    }
    if let Some(level) = args
        .get_one::<String>("log-level")
        .and_then(|name| LogLevel::from_name(name))
    {
        config.log_level = level;
    }
    Ok(config)
}

fn run(args: &ArgMatches) -> Result<RunReport> {
    let config = load_config(args)?;
    init_logging(config.log_level);
    log::info!(
        "Mode {:?}, seed {}, snapshots in {:?}",
        config.mode,
        config.seed,
        config.snapshots_dir
    );

    let sample = match (
        args.get_one::<PathBuf>("sample-image"),
        args.get_one::<PathBuf>("sample-annotations"),
    ) {
        (Some(image), Some(annotations)) => Sample::load(image, annotations, true)?,
        _ => Sample::generate(),
    };

    let work_dir = args
        .get_one::<PathBuf>("work-dir")
        .cloned()
        .unwrap_or_else(|| std::env::temp_dir().join("augsnap"));
    let names: Vec<String> = args
        .get_many::<String>("names")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let harness = Harness::new(&config, sample);
    let report = harness.run_all(&work_dir, &names)?;

    print_summary(&report);
    if let Some(path) = args.get_one::<PathBuf>("report") {
        write_report(path, &report)?;
    }
    Ok(report)
}

fn print_summary(report: &RunReport) {
    for case in report.failures() {
        println!(
            "FAILED {} ({:?}): {}",
            case.name,
            case.check,
            case.error.as_deref().unwrap_or_default()
        );
    }
    println!(
        "{} passed, {} failed ({} checks)",
        report.passed(),
        report.failed(),
        report.cases.len()
    );
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = report.to_json().map_err(|e| HarnessError::Io {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, json).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Wrote report to {:?}", path);
    Ok(())
}
