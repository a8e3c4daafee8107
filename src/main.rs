use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragchat::config::Config;
use ragchat::index::{VectorIndex, persist};
use ragchat::service::RagService;
use ragchat::{embedder, llm, server};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ragchat", version, about = "Answer questions about your documents")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from the configured documents and save it.
    Index {
        /// Rebuild even if a compatible index already exists.
        #[arg(long)]
        force: bool,
    },
    /// Ask a single question.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Interactive question loop.
    Chat,
    /// Print index statistics.
    Stats,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Build the service outside any async runtime: the HTTP model clients are
/// blocking and must not be created or dropped on a runtime thread.
fn open_service(config: Config, force: bool) -> Result<Arc<RagService>> {
    let embedder = embedder::from_config(&config.embedding, config.embedding_api_key())?;
    let model = llm::from_config(&config.llm, config.llm_api_key())?;
    info!("Embedder: {}, LLM: {}", embedder.model_id(), model.name());

    let service = if force {
        let empty = VectorIndex::empty(
            config.retrieval.metric,
            embedder.dimensions(),
            embedder.model_id(),
        );
        let service = RagService::new(config, embedder, model, empty);
        service.rebuild_from_corpus()?;
        service
    } else {
        RagService::open_or_build(config, embedder, model)?
    };
    Ok(Arc::new(service))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Index { force } => {
            let existed = persist::exists(Path::new(&config.index_dir));
            let service = open_service(config, force)?;
            let stats = service.stats();
            if existed && !force {
                println!(
                    "Index is up to date ({} chunks). Use --force to rebuild.",
                    stats.index.total_chunks
                );
            } else {
                println!(
                    "Indexed {} chunks from {} documents.",
                    stats.index.total_chunks,
                    stats.index.documents.len()
                );
            }
        }
        Commands::Ask { question, top_k } => {
            let service = open_service(config, false)?;
            let k = top_k.unwrap_or(service.config().retrieval.top_k);
            let answer = service.ask_with(&question, k)?;
            print_answer(&answer.answer, &answer.sources);
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let service = open_service(config, false)?;
            let runtime =
                tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            runtime.block_on(server::serve(Arc::clone(&service), &bind))?;
        }
        Commands::Chat => {
            let service = open_service(config, false)?;
            run_chat(&service)?;
        }
        Commands::Stats => {
            let service = open_service(config, false)?;
            println!("{}", serde_json::to_string_pretty(&service.stats())?);
        }
    }

    Ok(())
}

fn print_answer(answer: &str, sources: &[String]) {
    println!("{answer}");
    if !sources.is_empty() {
        println!("\nSources: {}", sources.join(", "));
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /help     Show this help");
    println!("  /stats    Show index statistics");
    println!("  /rebuild  Reload documents and rebuild the index");
    println!("  /quit     Exit");
}

fn run_chat(service: &RagService) -> Result<()> {
    let stats = service.stats();
    println!(
        "ragchat ready: {} chunks from {} documents. Type /help for commands.",
        stats.index.total_chunks,
        stats.index.documents.len()
    );

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/help" => print_help(),
            "/stats" => println!("{}", serde_json::to_string_pretty(&service.stats())?),
            "/rebuild" => match service.rebuild_from_corpus() {
                Ok(stats) => println!("Rebuilt index: {} chunks.", stats.total_chunks),
                Err(e) => eprintln!("Rebuild failed: {e:#}"),
            },
            question => match service.ask(question) {
                Ok(answer) => print_answer(&answer.answer, &answer.sources),
                Err(e) => eprintln!("Error: {e}"),
            },
        }
    }

    println!("Goodbye.");
    Ok(())
}
