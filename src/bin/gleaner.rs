//! Gleaner CLI: run harvests and inspect the run ledger.
//!
//! Usage:
//!   gleaner harvest --source catalog --kind resource --status updated [--config path] [--db path]
//!   gleaner runs <subcommand> [--config path] [--db path]

use clap::{Parser, Subcommand};
use gleaner::{
    ChangeStatus, GleanerConfig, HarvestContext, HarvestOrchestrator, OpenLedger, RecordKind, Run,
    RunFilter, RunId, RunLedger, Source, SqliteLedger,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gleaner",
    version,
    about = "Incremental harvest-merge pipeline for archival records"
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to the run ledger database
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest one (source, kind, change-status) since the last finished run
    Harvest {
        #[arg(long)]
        source: Source,
        #[arg(long)]
        kind: RecordKind,
        #[arg(long)]
        status: ChangeStatus,
        /// Override the number of concurrent enrichment tasks
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Inspect and maintain the run ledger
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
}

#[derive(Subcommand)]
enum RunsAction {
    /// List runs, newest first
    List {
        #[arg(long)]
        source: Option<Source>,
        #[arg(long)]
        kind: Option<RecordKind>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one run and its errors
    Show {
        /// Run ID
        id: String,
    },
    /// Delete old error-free finished runs
    Prune {
        /// Finished runs to keep per (source, kind, status)
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },
    /// Print the watermark the next harvest would use
    Last {
        #[arg(long)]
        source: Source,
        #[arg(long)]
        kind: RecordKind,
        #[arg(long)]
        status: ChangeStatus,
    },
}

fn load_config(path: Option<&PathBuf>, db: Option<PathBuf>) -> Result<GleanerConfig, String> {
    let mut config = match path {
        Some(path) => GleanerConfig::load(path).map_err(|e| e.to_string())?,
        None => GleanerConfig::default(),
    };
    if db.is_some() {
        config.ledger_path = db;
    }
    Ok(config)
}

fn open_ledger(config: &GleanerConfig) -> Result<SqliteLedger, String> {
    let path = config.ledger_path();
    SqliteLedger::open(&path).map_err(|e| format!("Failed to open ledger {}: {}", path.display(), e))
}

fn print_run(run: &Run) {
    let end = run
        .end_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<36}  {:<11}  {:<26}  {:<7}  {:<8}  {:>6}  {}  {}",
        run.id,
        run.source,
        run.kind,
        run.change_status,
        run.status,
        run.error_count,
        run.start_time.to_rfc3339(),
        end
    );
}

async fn cmd_harvest(
    config: GleanerConfig,
    source: Source,
    kind: RecordKind,
    status: ChangeStatus,
) -> i32 {
    let ledger = match open_ledger(&config) {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let context = match HarvestContext::from_config(&config, ledger.clone()) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let orchestrator = HarvestOrchestrator::new(context);
    match orchestrator.harvest(source, kind, status).await {
        Ok(report) => {
            println!(
                "Processed {} {} {} record(s) from {} (run {})",
                report.processed(),
                status,
                kind,
                source,
                report.run.id
            );
            if report.run.error_count > 0 {
                println!("{} error(s):", report.run.error_count);
                match ledger.errors(&report.run.id) {
                    Ok(errors) => {
                        for error in errors {
                            println!("  {}", error.message);
                        }
                    }
                    Err(e) => eprintln!("Warning: could not load run errors: {}", e),
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_runs_list(
    ledger: &dyn RunLedger,
    source: Option<Source>,
    kind: Option<RecordKind>,
    limit: usize,
) -> i32 {
    let mut filter = RunFilter::new().with_limit(limit);
    if let Some(source) = source {
        filter = filter.with_source(source);
    }
    if let Some(kind) = kind {
        filter = filter.with_kind(kind);
    }

    let runs = match ledger.list_runs(&filter) {
        Ok(runs) => runs,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if runs.is_empty() {
        println!("No runs recorded.");
        return 0;
    }
    println!(
        "{:<36}  {:<11}  {:<26}  {:<7}  {:<8}  {:>6}  {}",
        "ID", "SOURCE", "KIND", "CHANGE", "STATUS", "ERRORS", "STARTED / ENDED"
    );
    println!("{}", "-".repeat(140));
    for run in &runs {
        print_run(run);
    }
    0
}

fn cmd_runs_show(ledger: &dyn RunLedger, id: &str) -> i32 {
    let id = RunId::from(id);
    let run = match ledger.get_run(&id) {
        Ok(Some(run)) => run,
        Ok(None) => {
            eprintln!("Error: run '{}' not found", id);
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Run:      {}", run.id);
    println!("Source:   {}", run.source);
    println!("Kind:     {}", run.kind);
    println!("Change:   {}", run.change_status);
    println!("Status:   {}", run.status);
    println!("Started:  {}", run.start_time.to_rfc3339());
    if let Some(end) = run.end_time {
        println!("Ended:    {}", end.to_rfc3339());
    }
    if let Some(elapsed) = run.elapsed() {
        println!("Elapsed:  {}s", elapsed.num_seconds());
    }

    match ledger.errors(&run.id) {
        Ok(errors) if errors.is_empty() => {
            println!("Errors:   none");
            0
        }
        Ok(errors) => {
            println!("Errors:   {}", errors.len());
            for error in errors {
                println!("  [{}] {}", error.created_at.to_rfc3339(), error.message);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_runs_prune(ledger: &dyn RunLedger, keep: usize) -> i32 {
    match ledger.prune_finished(keep) {
        Ok(deleted) => {
            println!("Pruned {} run(s)", deleted);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_runs_last(ledger: &dyn RunLedger, source: Source, kind: RecordKind, status: ChangeStatus) -> i32 {
    match ledger.last_finished_run_timestamp(source, kind, status) {
        Ok(watermark) => {
            println!("{}", watermark);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_ref(), cli.db) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Harvest {
            source,
            kind,
            status,
            concurrency,
        } => {
            let mut config = config;
            if let Some(concurrency) = concurrency {
                config.harvest.concurrency = concurrency;
            }
            cmd_harvest(config, source, kind, status).await
        }
        Commands::Runs { action } => {
            let ledger = match open_ledger(&config) {
                Ok(ledger) => ledger,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match action {
                RunsAction::List { source, kind, limit } => cmd_runs_list(&ledger, source, kind, limit),
                RunsAction::Show { id } => cmd_runs_show(&ledger, &id),
                RunsAction::Prune { keep } => cmd_runs_prune(&ledger, keep),
                RunsAction::Last { source, kind, status } => cmd_runs_last(&ledger, source, kind, status),
            }
        }
    };
    std::process::exit(code);
}
