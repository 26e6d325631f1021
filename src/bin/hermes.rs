use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hermes_pipeline::config::{ConfigLoader, ResolvedConfig};
use hermes_pipeline::domain::RunStatus;
use hermes_pipeline::error::HermesError;
use hermes_pipeline::fetch::{Fetcher, HttpTransport, Throttle};
use hermes_pipeline::orchestrator::{NoProgress, Orchestrator, ProgressSink};
use hermes_pipeline::output::{
    CollectorInfo, InitResult, JsonOutput, OutputMode, StderrProgress, TextOutput,
};
use hermes_pipeline::providers::{
    COLLECTOR_NAMES, SourceAdapter, build_adapters, build_resolver,
};
use hermes_pipeline::store::SqliteStore;
use hermes_pipeline::validate::Validator;

#[derive(Parser)]
#[command(name = "hermes")]
#[command(about = "Collect markets, space, weather, news and disaster data into one SQLite store")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./hermes.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create or migrate the database")]
    Init,
    #[command(about = "Run collectors in sequence")]
    Collect(CollectArgs),
    #[command(about = "List available collectors")]
    Collectors,
    #[command(about = "Per-collector success rates")]
    Stats,
    #[command(about = "Recent collection runs, newest first")]
    Runs(RunsArgs),
}

#[derive(Args)]
struct CollectArgs {
    /// Collector names; all collectors when omitted
    names: Vec<String>,

    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct RunsArgs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(hermes) = report.downcast_ref::<HermesError>() {
            return ExitCode::from(map_exit_code(hermes));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HermesError) -> u8 {
    match error {
        HermesError::UnknownCollector(_)
        | HermesError::UnknownSource(_)
        | HermesError::InvalidRecordKind(_)
        | HermesError::ConfigRead(_)
        | HermesError::ConfigParse(_)
        | HermesError::InvalidConfig(_) => 2,
        HermesError::Storage(_) | HermesError::Filesystem(_) => 3,
        HermesError::RunsFailed(_) | HermesError::HttpClient(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => run_init(&config, output_mode),
        Commands::Collect(args) => run_collect(args, &config, output_mode),
        Commands::Collectors => run_collectors(&config, output_mode),
        Commands::Stats => run_stats(&config, output_mode),
        Commands::Runs(args) => run_runs(args, &config, output_mode),
    }
}

fn open_store(config: &ResolvedConfig) -> Result<SqliteStore, HermesError> {
    let store = SqliteStore::open(&config.database)?;
    info!(database = %config.database, "opened store");
    Ok(store)
}

fn run_init(config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let store = open_store(config)?;
    let result = InitResult {
        database: config.database.to_string(),
        schema_version: store.schema_version().map_err(HermesError::from)?,
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_init(&result).into_diagnostic()?,
        OutputMode::Text => println!(
            "database ready at {} (schema v{})",
            result.database, result.schema_version
        ),
    }
    Ok(())
}

fn run_collect(
    args: CollectArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let adapters = select_adapters(build_adapters(config), &args)?;
    let store = open_store(config)?;
    let transport = HttpTransport::new()?;
    let fetcher = Fetcher::new(transport, config.retry, Throttle::new(config.throttle.clone()));
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &NoProgress,
        OutputMode::Text => &StderrProgress,
    };

    let mut orchestrator = Orchestrator::new(
        &store,
        &fetcher,
        Validator::new(config.collection_epoch),
        build_resolver(config),
    )
    .with_progress(sink);
    let runs = orchestrator.run_all(&adapters);

    match output_mode {
        OutputMode::Json => JsonOutput::print_runs(&runs).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_runs(&runs).into_diagnostic()?,
    }

    let failed = runs
        .iter()
        .filter(|run| run.status == RunStatus::Failure)
        .count();
    if failed > 0 {
        return Err(HermesError::RunsFailed(failed).into());
    }
    Ok(())
}

fn select_adapters(
    adapters: Vec<Box<dyn SourceAdapter>>,
    args: &CollectArgs,
) -> Result<Vec<Box<dyn SourceAdapter>>, HermesError> {
    if args.all || args.names.is_empty() {
        return Ok(adapters);
    }
    for name in &args.names {
        if !COLLECTOR_NAMES.contains(&name.as_str()) {
            return Err(HermesError::UnknownCollector(name.clone()));
        }
    }
    let mut pool = adapters.into_iter().map(Some).collect::<Vec<_>>();
    let mut selected = Vec::new();
    for name in &args.names {
        let slot = pool.iter_mut().find(|slot| {
            slot.as_ref()
                .is_some_and(|adapter| adapter.collector_name() == name.as_str())
        });
        if let Some(adapter) = slot.and_then(Option::take) {
            selected.push(adapter);
        }
    }
    Ok(selected)
}

fn run_collectors(config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let collectors = build_adapters(config)
        .iter()
        .map(|adapter| CollectorInfo::describe(adapter.as_ref()))
        .collect::<Vec<_>>();
    match output_mode {
        OutputMode::Json => JsonOutput::print_collectors(&collectors).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_collectors(&collectors).into_diagnostic()?,
    }
    Ok(())
}

fn run_stats(config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let store = open_store(config)?;
    let stats = store.success_rates().map_err(HermesError::from)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_stats(&stats).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_stats(&stats).into_diagnostic()?,
    }
    Ok(())
}

fn run_runs(
    args: RunsArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let store = open_store(config)?;
    let runs = store.recent_runs(args.limit).map_err(HermesError::from)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_recent(&runs).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_recent(&runs).into_diagnostic()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_pipeline::error::StorageError;

    #[test]
    fn failed_runs_and_config_errors_map_to_distinct_exit_codes() {
        assert_eq!(map_exit_code(&HermesError::RunsFailed(2)), 1);
        assert_eq!(map_exit_code(&HermesError::ConfigParse("eof".into())), 2);
        assert_eq!(map_exit_code(&HermesError::UnknownCollector("tides".into())), 2);
        assert_eq!(
            map_exit_code(&HermesError::Storage(StorageError::EmptyRow("news".into()))),
            3
        );
    }

    #[test]
    fn failed_runs_survive_the_report_round_trip() {
        let report: miette::Report = HermesError::RunsFailed(1).into();
        assert!(matches!(
            report.downcast_ref::<HermesError>(),
            Some(HermesError::RunsFailed(1))
        ));
    }
}
