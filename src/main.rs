//! # Folio CLI
//!
//! Terminal client for the folio Shakespeare chatbot.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio chat` | Interactive chat session (optional `--query` opener) |
//! | `folio ask "<question>"` | One-shot question, prints the answer |
//! | `folio check` | Probe embedding and vector-store connectivity |
//!
//! ## Examples
//!
//! ```bash
//! folio chat
//! folio chat --query "What does Hamlet say about death?"
//! folio ask "Who is Iago in Othello?"
//! folio check
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use folio::bot::Bot;
use folio::config::load_config;
use folio::embedding::create_embedder;
use folio::store::weaviate::WeaviateStore;
use folio::store::VectorSearchProvider;

/// Folio — a retrieval-augmented chatbot for Shakespeare's works.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/folio.example.toml`.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio — a retrieval-augmented chatbot for Shakespeare's works",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Type questions at the prompt; slash commands control the
    /// session: `/new` clears history, `/export <file>` saves the
    /// transcript, `/help` lists commands, `/quit` exits.
    Chat {
        /// Ask this question first, then continue interactively.
        #[arg(long, short)]
        query: Option<String>,
    },

    /// Ask a single question and print the answer.
    Ask {
        /// The question to ask.
        query: String,
    },

    /// Probe connectivity to the embedding model and vector store.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Chat { query } => {
            let bot = Bot::from_config(&config).context("Failed to initialize bot")?;
            run_chat(&bot, query).await
        }
        Commands::Ask { query } => {
            let bot = Bot::from_config(&config).context("Failed to initialize bot")?;
            run_ask(&bot, &query).await
        }
        Commands::Check => run_check(&config).await,
    }
}

async fn run_ask(bot: &Bot, query: &str) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let outcome = bot
        .answer(&session_id, query)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}", outcome.answer_text);
    Ok(())
}

async fn run_chat(bot: &Bot, initial_query: Option<String>) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();

    println!("Folio — ask me anything about Shakespeare's plays, sonnets, and poems.");
    println!("Type /help for commands, /quit to exit.\n");

    if let Some(query) = initial_query {
        println!("You: {query}");
        answer_and_print(bot, &session_id, &query).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker().await?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break, // EOF
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "quit" | "exit" => break,
            "/help" => print_help(),
            "/new" => {
                bot.sessions().end(&session_id);
                println!("Conversation history cleared.");
            }
            _ if input.starts_with("/export") => {
                export_session(bot, &session_id, input).await;
            }
            _ if input.starts_with('/') => {
                println!("Unknown command: {input}. Type /help for commands.");
            }
            query => answer_and_print(bot, &session_id, query).await,
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn prompt_marker() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"You: ").await?;
    stdout.flush().await?;
    Ok(())
}

async fn answer_and_print(bot: &Bot, session_id: &str, query: &str) {
    match bot.answer(session_id, query).await {
        Ok(outcome) => {
            println!("\nFolio: {}\n", outcome.answer_text);
            if !outcome.used_chunk_ids.is_empty() {
                let ids: Vec<&str> = outcome.used_chunk_ids.iter().map(String::as_str).collect();
                println!("  [grounded on: {}]\n", ids.join(", "));
            }
        }
        Err(e) => eprintln!("\nError: {e}\n"),
    }
}

async fn export_session(bot: &Bot, session_id: &str, input: &str) {
    let filename = input.trim_start_matches("/export").trim();
    if filename.is_empty() {
        println!("Usage: /export <filename>");
        return;
    }
    let mut path = PathBuf::from(filename);
    if path.extension().is_none() {
        path.set_extension("txt");
    }

    let handle = bot.sessions().session(session_id);
    let state = handle.lock().await;
    if state.is_empty() {
        println!("No conversation to export.");
        return;
    }
    match state.export(&path) {
        Ok(()) => println!("Conversation exported to '{}'.", path.display()),
        Err(e) => eprintln!("Export failed: {e}"),
    }
}

fn print_help() {
    println!(
        "\nCommands:\n\
         \x20 /new              clear the conversation history\n\
         \x20 /export <file>    save the transcript to a text file\n\
         \x20 /help             show this message\n\
         \x20 /quit             exit\n\n\
         Anything else is treated as a question about Shakespeare's works.\n"
    );
}

async fn run_check(config: &folio::config::Config) -> Result<()> {
    println!("Checking embedding provider ({})...", config.embedding.provider);
    let embedder = create_embedder(&config.embedding).context("Embedding provider setup failed")?;
    let vector = embedder
        .embed("A test of the embedding model")
        .await
        .context("Embedding call failed")?;
    println!("  ok: {} returned {} dims", embedder.model_name(), vector.len());

    println!("Checking vector store at {}...", config.store.url);
    let store = WeaviateStore::new(&config.store).context("Vector store setup failed")?;
    let hits = store
        .search(&vector, 3, None)
        .await
        .context("Vector store query failed")?;
    println!("  ok: query returned {} chunk(s)", hits.len());

    if hits.is_empty() {
        println!("  note: the store answered but holds no matching chunks — has the corpus been loaded?");
    }

    println!("All checks passed.");
    Ok(())
}
