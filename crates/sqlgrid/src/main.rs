//! sqlgrid CLI
//!
//! Manage registered databases and run statements from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use sqlgrid::config::Settings;
use sqlgrid::database::DatabaseRecord;
use sqlgrid::service::{ExecuteResponse, Service, TableData};
use sqlgrid_core::format::{format_statement, SqlFormatRule};

/// Editable SQL result grids.
#[derive(Parser)]
#[command(name = "sqlgrid")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (JSON).
    #[arg(short, long, env = "SQLGRID_CONFIG")]
    config: Option<PathBuf>,

    /// Settings repository, `ProviderName=<name>;<connection string>`.
    #[arg(short, long, env = "SQLGRID_REPOSITORY")]
    repository: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered databases.
    Databases,

    /// Register a database.
    AddDatabase {
        /// Display name.
        #[arg(short, long)]
        caption: String,

        /// Provider name (`sqlite` or `postgres`).
        #[arg(short, long)]
        provider: String,

        /// Provider connection string.
        #[arg(short = 's', long)]
        connection_string: String,

        /// Id of a record to update (new record if not specified).
        #[arg(long)]
        id: Option<i32>,
    },

    /// List the tables of a database.
    Tables {
        /// Database id.
        #[arg(short, long)]
        database: i32,
    },

    /// Run the first statement of a script.
    Query {
        /// Database id.
        #[arg(short, long)]
        database: i32,

        /// Script to run; selects the whole table with `--table` if empty.
        #[arg(default_value = "")]
        script: String,

        /// Table to select from when no script is given.
        #[arg(short, long)]
        table: Option<String>,

        /// Row limit (negative for all rows).
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        rows: Option<i64>,

        /// Commit changes of a non-query instead of rolling them back.
        #[arg(long)]
        commit: bool,
    },

    /// Reflow a statement.
    Format {
        /// Statement text.
        script: String,

        /// Put every projected column on its own line.
        #[arg(long)]
        every_column: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Format {
        script,
        every_column,
    } = &cli.command
    {
        let rule = if *every_column {
            SqlFormatRule::EveryColumnInOneLine
        } else {
            SqlFormatRule::AllColumnsInOneLine
        };
        println!("{}", format_statement(script, rule));
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(repository) = cli.repository {
        settings.repository = repository;
    }
    let service = Service::start(settings).await?;

    match cli.command {
        Commands::Databases => print_json(&service.databases())?,

        Commands::AddDatabase {
            caption,
            provider,
            connection_string,
            id,
        } => {
            let record = service
                .save_database(DatabaseRecord {
                    id: id.unwrap_or(0),
                    caption,
                    provider_name: provider,
                    connection_string,
                })
                .await?;
            info!(id = record.id, "Database saved");
            print_json(&record)?;
        }

        Commands::Tables { database } => print_json(&service.tables(database).await?)?,

        Commands::Query {
            database,
            script,
            table,
            rows,
            commit,
        } => {
            let response = service
                .execute(TableData {
                    database_id: database,
                    script,
                    table_name: table,
                    rows,
                    ..TableData::default()
                })
                .await?;
            print_json(&response)?;

            if let Some(ExecuteResponse::Changed(changed)) = response {
                let outcome = if commit {
                    service.transactions().commit(&changed.transaction_id).await?
                } else {
                    service.transactions().rollback(&changed.transaction_id).await
                };
                info!(
                    changed_rows = changed.changed_rows,
                    committed = commit && outcome.ok,
                    "Transaction finished"
                );
            }
        }

        Commands::Format { .. } => {}
    }

    Ok(())
}
