use std::fs::File;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use datalyst_core::config::AppConfig;
use datalyst_core::traits::{EntityIndex, Oracle, TabularStore};

use datalyst_gateway::{AppState, GatewayServer};
use datalyst_index::{HttpEmbeddingProvider, NullEntityIndex, SqliteEntityIndex};
use datalyst_store::{CsvDataset, DatasetStore};
use datalyst_workflow::AnalystEngine;

#[derive(Parser)]
#[command(name = "datalyst", version, about = "Conversational analyst over tabular data")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "datalyst.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve,
    /// Load a CSV file into the local dataset store
    Ingest {
        /// Path to the CSV file
        file: PathBuf,
    },
    /// Ask a single question and exit
    Ask {
        /// The question to answer
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("datalyst=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if cli.command.is_none() {
        Cli::command().print_help()?;
        return Ok(());
    }

    let config = AppConfig::load(&cli.config)?;

    if let Some(Commands::Config) = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    std::fs::create_dir_all(&config.storage.data_dir).ok();

    let store = Arc::new(DatasetStore::new(config.storage.dataset_path()));
    let oracle: Arc<dyn Oracle> = Arc::from(datalyst_llm::create_oracle(&config.model));

    // Entity resolution is optional: without an embedding endpoint the
    // mapper passes questions through unchanged.
    let index = config.embedding.as_ref().map(|embedding| {
        Arc::new(SqliteEntityIndex::new(
            config.storage.index_path(),
            Arc::new(HttpEmbeddingProvider::new(embedding)),
        ))
    });
    let entity_index: Arc<dyn EntityIndex> = match &index {
        Some(index) => index.clone(),
        None => Arc::new(NullEntityIndex),
    };

    let engine = Arc::new(AnalystEngine::new(
        oracle,
        store.clone() as Arc<dyn TabularStore>,
        entity_index,
        config.workflow.clone(),
    ));

    match cli.command {
        Some(Commands::Serve) => {
            let state = Arc::new(AppState::new(engine, store, index));
            let server = GatewayServer::new(config.gateway.clone(), state);

            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Some(Commands::Ingest { file }) => {
            let reader = File::open(&file)?;
            let dataset = CsvDataset::parse(reader)?;
            let report = store.ingest(&dataset)?;

            if let Some(index) = &index {
                index.rebuild(&report.entity_strings).await?;
                info!(entries = report.entity_strings.len(), "Entity index rebuilt");
            }

            println!(
                "Loaded {} rows ({} columns) from {}",
                report.row_count,
                report.columns.len(),
                file.display()
            );
        }
        Some(Commands::Ask { question }) => {
            let text = question.join(" ");
            let text = if text.is_empty() {
                // Read from stdin
                let stdin = io::stdin();
                stdin
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                text
            };

            let outcome = engine.run(&text).await?;
            if !outcome.generated_sql.is_empty() {
                eprintln!("-- {}", outcome.generated_sql);
            }
            println!("{}", outcome.final_answer);
        }
        Some(Commands::Config) | None => unreachable!(),
    }

    Ok(())
}
