//! Relstore Binary Entry Point
//!
//! Small administrative CLI over the `relstore` library: schema setup,
//! ad-hoc queries and column dumps against the configured engine.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use relstore::{
    StorageBuilder, Value,
    config::{AppConfig, DatabaseDriver, parse_duration},
    storage::admin,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relstore - engine-agnostic relational storage
#[derive(Parser, Debug)]
#[command(name = "relstore", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "RELSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage engine (overrides config file)
    #[arg(long, env = "RELSTORE_DB_DRIVER")]
    driver: Option<DatabaseDriver>,

    /// SQLite database path (overrides config file)
    #[arg(long, env = "RELSTORE_DB_PATH")]
    path: Option<String>,

    /// Connection timeout, e.g. "10s" (overrides config file)
    #[arg(long, value_parser = parse_duration, env = "RELSTORE_CONNECT_TIMEOUT")]
    connect_timeout: Option<Duration>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the schema: runs the script on sqlite, creates database and tables on postgres
    InitSchema {
        /// Schema file (defaults to `schema_path` from the config file)
        schema: Option<PathBuf>,
    },
    /// Run a SELECT and print one JSON document per row
    Query {
        /// SQL text
        sql: String,
        /// Print only the first column of each row
        #[arg(long)]
        column: bool,
    },
    /// Print every value of one column as a JSON array
    Dump {
        table: String,
        column: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relstore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration from file, or start from defaults
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(driver) = cli.driver {
        config.database.driver = driver;
    }
    if let Some(path) = cli.path {
        config.database.path = path;
    }
    if let Some(timeout) = cli.connect_timeout {
        config.database.connect_timeout = timeout;
    }
    config.validate()?;

    tracing::info!(
        "Database: {} ({})",
        match config.database.driver {
            DatabaseDriver::Sqlite => config.database.path.clone(),
            DatabaseDriver::Postgres => format!(
                "{}:{}/{}",
                config.database.host, config.database.port, config.database.name
            ),
        },
        config.database.driver,
    );

    match cli.command {
        Command::InitSchema { schema } => {
            let schema_path = schema
                .or_else(|| config.schema_path.as_ref().map(PathBuf::from))
                .ok_or("no schema file given and no schema_path configured")?;
            let schema = std::fs::read_to_string(&schema_path)?;

            match config.database.driver {
                DatabaseDriver::Sqlite => {
                    let store = StorageBuilder::from_config(&config.database).build()?;
                    if !store.initialize_schema(&schema).await {
                        return Err("schema build failed, see log for details".into());
                    }
                }
                DatabaseDriver::Postgres => {
                    let report =
                        admin::bootstrap(&config.database.server_target(), &schema).await?;
                    tracing::info!(
                        "Database {} {}, schema {} applied",
                        report.database,
                        report.creation,
                        schema_path.display()
                    );
                }
            }
        }
        Command::Query { sql, column } => {
            let store = StorageBuilder::from_config(&config.database).build()?;
            if column {
                for value in store.raw_select_column(&sql, &[]).await? {
                    println!("{}", serde_json::to_string(&value)?);
                }
            } else {
                for row in store.raw_select(&sql, &[]).await? {
                    println!("{}", serde_json::to_string(&row)?);
                }
            }
        }
        Command::Dump { table, column } => {
            let store = StorageBuilder::from_config(&config.database).build()?;
            let values: Vec<Value> = store.select_column(&table, &column).await?;
            println!("{}", serde_json::to_string(&values)?);
        }
    }

    Ok(())
}
