//! analyst CLI entry point

use analyst::{
    backend::MemoryBackend,
    commands::{
        cmd_ask, cmd_build_index, cmd_init, cmd_status, cmd_tables, print_analysis,
        print_index_stats, print_status, print_tables, print_workflow_failure,
    },
    config::Config,
    engine::{AskOptions, Engine},
    error::Result,
    gateway::{create_embedding_gateway, create_generation_gateway},
    progress::LogWriterFactory,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "analyst")]
#[command(version, about = "Natural-language analytics over a document store", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize analyst configuration and the sample dataset
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Ask a question about the data
    Ask {
        /// The question, in plain language
        question: String,

        /// Conversation ID to tag the answer with
        #[arg(long)]
        conversation: Option<Uuid>,

        /// Maximum regeneration/re-execution attempts
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Schema documents to retrieve for context
        #[arg(long)]
        top_k: Option<usize>,

        /// Per-call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Rebuild the schema index from the backend's description
    Index,

    /// List the available tables and their schemas
    Tables,

    /// Show engine status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Init needs no existing config
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Completions need no config either
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "analyst", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;

    let backend = Arc::new(load_backend(&config)?);
    let engine = Engine::new(
        &config,
        create_embedding_gateway(&config.embedding)?,
        create_generation_gateway(&config.generation)?,
        Arc::clone(&backend) as Arc<dyn analyst::backend::QueryBackend>,
    );

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ask {
            question,
            conversation,
            max_attempts,
            top_k,
            timeout_ms,
        } => {
            let stats = cmd_build_index(&engine).await?;
            for warning in &stats.warnings {
                eprintln!("⚠ {}", warning);
            }

            let options = AskOptions {
                max_attempts,
                top_k_schema: top_k,
                timeout_ms,
            };

            match cmd_ask(&engine, &question, conversation, options).await {
                Ok(result) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        print_analysis(&result);
                    }
                }
                Err(e) if e.is_terminal() => {
                    print_workflow_failure(&e);
                    std::process::exit(1);
                }
                Err(e) => return Err(e),
            }
        }

        Commands::Index => {
            let stats = cmd_build_index(&engine).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_index_stats(&stats);
            }
        }

        Commands::Tables => {
            let tables = cmd_tables(&backend).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                print_tables(&tables);
            }
        }

        Commands::Status => {
            let stats = cmd_build_index(&engine).await?;
            for warning in &stats.warnings {
                eprintln!("⚠ {}", warning);
            }
            let status = cmd_status(&config, &backend, &engine).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    let base_dir = cli
        .config
        .as_deref()
        .and_then(|p| {
            if p.extension().map_or(false, |e| e == "toml") {
                p.parent().map(PathBuf::from)
            } else {
                Some(p.to_path_buf())
            }
        });

    let config = cmd_init(base_dir, force).await?;

    println!("✓ analyst initialized successfully");
    println!("  Config: {}", config.paths.config_file.display());
    println!("\nNext steps:");
    println!("  1. Edit the config file to point at your gateways and dataset");
    println!("  2. Inspect the data: analyst tables");
    println!("  3. Ask a question: analyst ask \"What are the top 5 customers by order value?\"");

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'analyst init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}

fn load_backend(config: &Config) -> Result<MemoryBackend> {
    let Some(dataset) = config.dataset_path() else {
        eprintln!("No dataset configured. Set 'dataset' in config.toml or run 'analyst init'.");
        std::process::exit(1);
    };

    MemoryBackend::from_json_file(&dataset)
}
