use crate::{
    commands::{Commands, PageArgs},
    env::EnvManager,
    error::CliError,
    shutdown::Shutdown,
};
use clap::Parser;
use engine_core::{
    config::DbSettings,
    keyset::engine::KeysetQueryEngine,
    migration::{postgres::PgVersionStore, store::VersionStore, tester::MigrationTester},
    session::{self, SchemaSession},
};
use model::{core::value::Value, migration::version::SchemaVersion};
use planner::keyset::{ContinueQuery, Keyset, StartQuery};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Parser)]
#[command(
    name = "tessera",
    version = "0.1.0",
    about = "Schema migrations and keyset pagination for PostgreSQL"
)]
struct Cli {
    #[arg(long, global = true, help = "Load settings from this .env file")]
    env_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let shutdown = Shutdown::listen();

    let result = run(cli, shutdown.token()).await;
    match &result {
        Ok(()) => {}
        Err(err) if err.is_cancellation() || shutdown.received().is_some() => {
            info!("Stopped before completion: {err}");
        }
        Err(err) => error!("{err}"),
    }
    std::process::exit(shutdown.exit_code(&result).as_i32());
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), CliError> {
    let env = load_env(cli.env_file.as_deref())?;
    let settings = env.settings()?;
    debug!(settings = ?env.redacted(), "Loaded settings");

    match cli.command {
        Commands::Migrate { to } => {
            let target = target_version(&settings, to.as_deref())?;
            let session = SchemaSession::open(settings, cancel).await?;
            let outcome = session.coordinator().migrate_to(target).await?;
            output::print_outcome(session.database().schema(), target, outcome);
        }
        Commands::Status { json } => {
            let db = session::connect(&settings).await?;
            let store = PgVersionStore::new(db, settings.channel());
            store.ensure_table().await?;
            let current = store.current_version().await?;
            let in_progress = store.in_progress().await?;

            if json {
                let status = serde_json::json!({
                    "schema": settings.schema,
                    "deployed": current,
                    "inProgress": in_progress,
                });
                output::write_json(&status, None).await?;
            } else {
                output::print_status(&settings.schema, current, &in_progress);
            }
        }
        Commands::Plan { to, json } => {
            let target = target_version(&settings, to.as_deref())?;
            let session = SchemaSession::open(settings, cancel).await?;
            let plan = session.coordinator().plan(target).await?;
            if json {
                output::write_json(&plan, None).await?;
            } else {
                output::print_plan(&plan);
            }
        }
        Commands::Verify { from, to } => {
            let from = parse_version("--from", &from)?;
            let target = target_version(&settings, to.as_deref())?;
            let report = MigrationTester::new(&settings, from, target)
                .run(cancel)
                .await?;
            output::print_report(&report);
            if !report.is_consistent() {
                return Err(CliError::Inconsistent(report.mismatches.len()));
            }
        }
        Commands::Page(args) => {
            let db = session::connect(&settings).await?;
            let engine = KeysetQueryEngine::new(db);
            let keyset = build_keyset(&args)?;

            let page = tokio::select! {
                _ = cancel.cancelled() => return Err(CliError::ShutdownRequested),
                page = engine.query(&keyset) => page?,
            };
            output::write_json(&page, args.output.as_deref()).await?;
        }
    }

    Ok(())
}

/// Process environment, overridden by the given .env file or by `./.env`
/// when present.
fn load_env(env_file: Option<&str>) -> Result<EnvManager, CliError> {
    let mut env = EnvManager::new();
    match env_file {
        Some(path) => env.load_from_file(path)?,
        None if Path::new(DEFAULT_ENV_FILE).exists() => env.load_from_file(DEFAULT_ENV_FILE)?,
        None => {}
    }
    Ok(env)
}

fn target_version(settings: &DbSettings, to: Option<&str>) -> Result<SchemaVersion, CliError> {
    match to {
        Some(version) => parse_version("--to", version),
        None => Ok(settings.target_version),
    }
}

fn parse_version(flag: &str, version: &str) -> Result<SchemaVersion, CliError> {
    version
        .parse()
        .map_err(|e| CliError::InvalidArgument(format!("{flag}: {e}")))
}

fn build_keyset(args: &PageArgs) -> Result<Keyset, CliError> {
    let keyset = Keyset::new(&args.table);

    if let Some(cursor) = &args.cursor {
        let query = ContinueQuery {
            next: args.next,
            prev: args.prev,
        };
        return Ok(keyset.continue_from(cursor, query)?);
    }

    let field = args.field.as_deref().ok_or_else(|| {
        CliError::InvalidArgument("either --field or --cursor is required".to_string())
    })?;

    let mut keyset = keyset;
    for filter in &args.filter {
        let (name, value) = filter.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("--filter `{filter}` is not FIELD=VALUE"))
        })?;
        keyset = keyset.where_eq(name.trim(), Value::String(value.trim().to_string()));
    }

    let mut query = StartQuery::new(field);
    if let Some(first) = args.first {
        query = query.first(first);
    }
    if let Some(last) = args.last {
        query = query.last(last);
    }
    if let Some(search) = &args.search {
        query = query.search(search.clone());
    }
    if let Some(desc) = args.desc {
        query = query.desc(desc);
    }
    Ok(keyset.start(query)?)
}
