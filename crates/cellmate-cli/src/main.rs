use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cellmate_core::{
    Cell, CellAnalyzer, Config, Gateway, GatewayConfig, Intent, IntentDispatcher, ModelRegistry,
    OllamaClient, Outcome, Question, UnitKind,
};
use clap::{Parser, Subcommand};
use colored::*;
use futures_util::future::join_all;

mod chat;

#[derive(Parser)]
#[command(name = "cellmate")]
#[command(about = "Ask a local model about notebook cells, or chat with it")]
struct Cli {
    /// Assistant backend base URL (defaults to config, then http://localhost:8888/api/ollama)
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Model to use instead of the configured/default one
    #[arg(short, long, global = true)]
    model: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available models
    Models {
        /// Save this model as the default
        #[arg(long)]
        set: Option<String>,
    },
    /// Chat with the assistant (one message per line)
    Chat,
    /// Ask about the contents of a cell stored in FILE
    Ask {
        file: PathBuf,
        /// Cell type: code or markdown (guessed from the extension if omitted)
        #[arg(short, long, value_parser = ["code", "markdown"])]
        kind: Option<String>,
        /// Predefined question: explain, optimize, find-bugs, overview (repeatable)
        #[arg(short, long = "question", value_parser = parse_question)]
        questions: Vec<Question>,
        /// Free-form question
        #[arg(short, long)]
        text: Option<String>,
    },
    /// Print the embedding vector of TEXT
    Embed { text: String },
}

fn parse_question(s: &str) -> std::result::Result<Question, String> {
    Question::from_str(s).ok_or_else(|| {
        let names: Vec<&str> = Question::all().iter().map(Question::as_str).collect();
        format!("unknown question '{}', expected one of: {}", s, names.join(", "))
    })
}

/// Targets match by prefix, so this covers both `cellmate` and `cellmate_core`.
const DEFAULT_LOG_FILTER: &str = "cellmate=info";

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Shared pieces every command needs.
struct Session {
    client: Arc<OllamaClient>,
    registry: Arc<ModelRegistry>,
}

impl Session {
    fn new(cli: &Cli) -> Self {
        let mut config = Config::load()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring unreadable config");
                Config::new()
            })
            .with_env_overrides();
        if let Some(url) = &cli.base_url {
            config.base_url = Some(url.clone());
        }

        let client = Arc::new(OllamaClient::with_config(GatewayConfig::from(&config)));
        let registry = Arc::new(ModelRegistry::from_config(client.clone(), &config));
        if let Some(model) = &cli.model {
            registry.select(model.clone());
        }
        Self { client, registry }
    }

    /// Refreshes the registry, printing a warning instead of failing.
    async fn refresh_models(&self) -> bool {
        match self.registry.refresh().await {
            Ok(_) => true,
            Err(e) => {
                println!("{}: {}", "Could not list models".red(), e);
                println!("Make sure Jupyter and Ollama are running: {}", "ollama serve".bold());
                false
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let session = Session::new(&cli);

    match cli.command {
        Commands::Models { set } => list_models(&session, set.as_deref()).await?,
        Commands::Chat => chat::run(&session).await?,
        Commands::Ask { file, kind, questions, text } => {
            ask_about_cell(&session, &file, kind.as_deref(), questions, text).await?
        }
        Commands::Embed { text } => embed(&session, &text).await?,
    }

    Ok(())
}

async fn list_models(session: &Session, set: Option<&str>) -> Result<()> {
    if let Some(model) = set {
        Config::save_default_model(model).context("saving default model")?;
        session.registry.select(model);
        println!("Default model set to {}", model.green());
    }

    println!("\n{}", "🤖 Available Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    if !session.refresh_models().await {
        return Ok(());
    }

    let snapshot = session.registry.snapshot();
    if snapshot.available.is_empty() {
        println!("{}", "No models found. Pull a model with: ollama pull llama3.2".yellow());
        return Ok(());
    }

    for model in snapshot.available.iter() {
        let marker = if snapshot.selected.as_deref() == Some(model.name.as_str()) {
            "●".green()
        } else {
            "•".normal()
        };
        let details: Vec<String> = [model.parameter_size.clone(), model.display_size()]
            .into_iter()
            .flatten()
            .collect();
        if details.is_empty() {
            println!("  {} {}", marker, model.name.green());
        } else {
            println!("  {} {} {}", marker, model.name.green(), format!("({})", details.join(", ")).dimmed());
        }
    }

    if let Some(selected) = &snapshot.selected {
        if !snapshot.contains(selected) {
            println!("\n{} {} is selected but not installed", "⚠️ ".yellow(), selected.bold());
        }
    }

    Ok(())
}

fn guess_kind(path: &Path) -> UnitKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") | Some("markdown") => UnitKind::Markdown,
        _ => UnitKind::Code,
    }
}

async fn ask_about_cell(
    session: &Session,
    file: &Path,
    kind: Option<&str>,
    questions: Vec<Question>,
    text: Option<String>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let kind = kind.map(UnitKind::from_cell_type).unwrap_or_else(|| guess_kind(file));
    let cell = Cell::new(content, kind);

    let mut intents: Vec<Intent> = questions.into_iter().map(Intent::Predefined).collect();
    if let Some(text) = text {
        intents.push(Intent::FreeText(text));
    }
    if intents.is_empty() {
        intents.push(Intent::Predefined(Question::Explain));
    }

    if session.registry.current().is_none() {
        session.refresh_models().await;
    }
    let model = session.registry.current().unwrap_or_else(|| "<none>".to_string());

    let dispatcher = IntentDispatcher::new(CellAnalyzer::new(session.client.clone()), session.registry.clone());
    let mut handles = Vec::with_capacity(intents.len());
    for intent in &intents {
        handles.push(dispatcher.dispatch(&cell, intent)?);
    }

    println!(
        "🤖 Asking {} about {} ({} cell)...\n",
        model.bold().magenta(),
        file.display(),
        kind.as_str()
    );

    let results = join_all(handles.into_iter().map(|h| h.finished())).await;
    for (intent, result) in intents.iter().zip(results) {
        let title = match intent {
            Intent::Predefined(q) => q.display_name().to_string(),
            Intent::FreeText(t) => t.trim().to_string(),
        };
        println!("{}", title.bold().green());
        match &result.outcome {
            Outcome::Error(_) => println!("{}\n", result.display_text().red()),
            _ => println!("{}\n", result.display_text()),
        }
    }

    Ok(())
}

async fn embed(session: &Session, text: &str) -> Result<()> {
    if session.registry.current().is_none() {
        session.refresh_models().await;
    }
    let Some(model) = session.registry.current() else {
        println!("{}", "No model selected. Use --model NAME.".red());
        return Ok(());
    };

    match session.client.embeddings(&model, text).await {
        Ok(vector) => {
            let head: Vec<String> = vector.iter().take(8).map(|v| format!("{v:.4}")).collect();
            println!("{} dimensions from {}", vector.len().to_string().bold(), model.magenta());
            println!("[{}{}]", head.join(", "), if vector.len() > 8 { ", ..." } else { "" });
        }
        Err(e) => println!("{}: {}", "Embedding failed".red(), e.user_message()),
    }
    Ok(())
}
