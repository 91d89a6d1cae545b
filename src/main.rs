//! CLI entry point for playground.

mod cli;

use clap::Parser;
use playground::api::{HttpBackend, PlaygroundBackend};
use playground::build_info::cli_version_text;
use playground::config::{load_config, Config};
use playground::orchestrator::{BatchReport, RunOrchestrator, SlotOutcome};
use playground::params::PlaygroundFile;
use playground::slots::{Slot, SlotIndex, SlotStore};
use playground::types::{ModelCatalog, TaskRef};
use playground::versions::{match_version, resolve_version, VersionChoice};
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

type CliResult = Result<(), Box<dyn Error>>;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    if args.version {
        println!("{}", cli_version_text());
        return;
    }
    init_tracing(args.verbose);

    let Some(command) = args.command else {
        eprintln!("error: no command given, see `playground --help`");
        std::process::exit(2);
    };

    let loaded = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    debug!(source = %loaded.source, "config loaded");

    let result = match command {
        cli::Command::Run(run) => run_command(&loaded.config, run).await,
        cli::Command::Match(matching) => match_command(&loaded.config, matching).await,
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// RUST_LOG wins; otherwise `-v` switches the crate to debug.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,playground=debug")
        } else {
            EnvFilter::new("warn,playground=info")
        }
    });
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn backend_for(config: &Config) -> Arc<dyn PlaygroundBackend> {
    if config.api.api_key.is_empty() {
        warn!("no API key configured; requests are sent unauthenticated");
    }
    Arc::new(HttpBackend::new(&config.api))
}

async fn run_command(config: &Config, args: cli::RunArgs) -> CliResult {
    let file = PlaygroundFile::load(&args.params)?;
    let backend = backend_for(config);
    let task = TaskRef::new(config.api.tenant.clone(), args.task);
    let schema = file.schema_state();

    let orchestrator = RunOrchestrator::new(
        backend.clone(),
        task.clone(),
        schema.clone(),
        SlotStore::new(),
    )
    .with_poller_config(config.poller.into());
    for index in SlotIndex::ALL {
        orchestrator.set_model(index, file.model(index));
    }
    orchestrator.set_parameters(file.parameters());
    orchestrator.set_input(file.input.clone());
    orchestrator.set_hidden_slots(
        config
            .playground
            .hidden_slots
            .iter()
            .chain(&file.hidden_slots)
            .copied(),
    );
    orchestrator.set_preferred_major(file.preferred_major);
    match backend.list_major_versions(&task, schema.schema_id).await {
        Ok(majors) => orchestrator.set_major_versions(majors),
        Err(e) => warn!(error = %e, "could not list major versions; every slot creates a version"),
    }

    let requested: Vec<SlotIndex> = args
        .slots
        .iter()
        .filter_map(|&slot| SlotIndex::new(usize::from(slot)))
        .collect();
    let indexes = (!requested.is_empty()).then_some(requested.as_slice());

    let batch = orchestrator.perform_runs(indexes);
    tokio::pin!(batch);
    let report = tokio::select! {
        report = &mut batch => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling runs");
            orchestrator.cancel_all();
            batch.await
        }
    }?;

    print_report(&report, orchestrator.store(), orchestrator.catalog().as_ref());
    if let Some(usage) = orchestrator.organization_usage() {
        debug!(?usage, "organization usage");
    }
    Ok(())
}

fn print_report(report: &BatchReport, store: &SlotStore, catalog: Option<&ModelCatalog>) {
    if let Some(schema_id) = report.schema_change {
        println!("schema migrated to #{schema_id}");
    }
    let snapshot = store.snapshot();
    for (index, outcome) in &report.outcomes {
        println!(
            "{}",
            summary_line(*index, outcome, snapshot.get(*index), catalog)
        );
    }
}

fn summary_line(
    index: SlotIndex,
    outcome: &SlotOutcome,
    slot: &Slot,
    catalog: Option<&ModelCatalog>,
) -> String {
    let model_id = slot.model_id.as_deref().unwrap_or("-");
    // Catalog display names win over raw ids.
    let model = catalog
        .and_then(|catalog| catalog.find(model_id))
        .and_then(|info| info.name.as_deref())
        .unwrap_or(model_id);
    let output = slot
        .stream
        .as_ref()
        .and_then(|stream| stream.output.as_ref())
        .map(|output| format!(" {output}"))
        .unwrap_or_default();
    match outcome {
        SlotOutcome::Completed { run_id, confirmed } => {
            let note = if *confirmed { "" } else { " (unconfirmed)" };
            format!("[{index}] {model}: run {run_id}{note}{output}")
        }
        SlotOutcome::Adopted { run_id } => {
            format!("[{index}] {model}: run {run_id} ended with an error{output}")
        }
        SlotOutcome::Failed(error) => format!("[{index}] {model}: error: {}", error.message),
        SlotOutcome::Cancelled => format!("[{index}] {model}: cancelled"),
        SlotOutcome::Superseded => format!("[{index}] {model}: superseded"),
    }
}

async fn match_command(config: &Config, args: cli::MatchArgs) -> CliResult {
    let file = PlaygroundFile::load(&args.params)?;
    let backend = backend_for(config);
    let task = TaskRef::new(config.api.tenant.clone(), args.task);
    let majors = backend
        .list_major_versions(&task, file.schema.id)
        .await?;
    let params = file.parameters();

    let Some(matched) = match_version(
        &majors,
        params.temperature,
        &params.messages,
        file.preferred_major,
    ) else {
        println!("no major version matches; runs will create a new version");
        return Ok(());
    };
    println!("matches major version {}", matched.major);
    for index in SlotIndex::ALL {
        let Some(model) = file.model(index) else {
            continue;
        };
        let choice = resolve_version(
            &majors,
            &model,
            params.temperature,
            &params.messages,
            file.preferred_major,
        );
        match choice {
            VersionChoice::Reuse(version_id) => println!("[{index}] {model}: reuses {version_id}"),
            VersionChoice::Create => println!("[{index}] {model}: needs a new minor version"),
        }
    }
    Ok(())
}
