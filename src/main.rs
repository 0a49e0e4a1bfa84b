use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use topicdesk::app::{build_desk, build_matcher, pick_persona};
use topicdesk::assistant::ChatSession;
use topicdesk::config::{Config, DEFAULT_CONFIG_PATH};
use topicdesk::context::InferenceContext;
use topicdesk::{console, embedder, generation, server};

#[derive(Parser)]
#[command(name = "topicdesk", version, about = "Local help-desk chatbot")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Generation model id (overrides generation.default_model)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Pick the generation model from a menu at startup
    #[arg(long, global = true)]
    select_model: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive help desk (default)
    Desk,
    /// Free-form assistant chat
    Chat,
    /// Serve the help desk over HTTP
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
    /// List models available on the generation backend
    Models,
    /// Show which topic a question resolves to
    Resolve {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Download the embedding model files
    Download,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Desk) {
        Command::Desk => {
            let model = resolve_model(&config, cli.model, cli.select_model)?;
            let persona = pick_persona(&config, &mut rand::thread_rng());
            let desk = build_desk(&config, persona, Some(&model))?;
            console::run_desk(&desk, &mut io::stdin().lock(), &mut io::stdout())
        }
        Command::Chat => {
            let model = resolve_model(&config, cli.model, cli.select_model)?;
            let ctx = InferenceContext::from_config(&config.generation, &model)
                .context("failed to connect generation backend")?;
            let mut session = ChatSession::new(&config.assistant);
            console::run_assistant(&mut session, &ctx, &mut io::stdin().lock(), &mut io::stdout())
        }
        Command::Serve { bind } => {
            let model = resolve_model(&config, cli.model, cli.select_model)?;
            let persona = pick_persona(&config, &mut rand::thread_rng());
            let desk = Arc::new(build_desk(&config, persona, Some(&model))?);
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?
                .block_on(server::serve(&bind, desk, config.generation.clone()))
        }
        Command::Models => {
            let models = generation::list_models(&config.generation)?;
            let mut out = io::stdout();
            for model in models {
                let marker = if model == config.generation.default_model { "*" } else { " " };
                writeln!(out, "{marker} {model}")?;
            }
            Ok(())
        }
        Command::Resolve { query } => {
            let embedder = embedder::from_config(&config.embedding)?;
            let matcher = build_matcher(&config, embedder)?;
            let resolved = matcher.resolve(&query.join(" "))?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            Ok(())
        }
        Command::Download => {
            let dir = Path::new(&config.embedding.model_dir);
            embedder::download::download_model_files(dir, &config.embedding.name)?;
            info!("Model files ready in {}", dir.display());
            Ok(())
        }
    }
}

/// The `--model` flag, an interactive pick, or the configured default.
fn resolve_model(config: &Config, flag: Option<String>, select: bool) -> Result<String> {
    if let Some(model) = flag {
        return Ok(model);
    }
    let default = &config.generation.default_model;
    if !select {
        return Ok(default.clone());
    }

    let models = generation::list_models(&config.generation)
        .context("failed to list models from the generation backend")?;
    anyhow::ensure!(!models.is_empty(), "no models are loaded on the generation backend");
    console::select_model(&models, default, &mut io::stdin().lock(), &mut io::stdout())
}
