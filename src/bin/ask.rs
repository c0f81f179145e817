use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use movie_companion::companion::{CompanionConfig, MovieCompanion};
use movie_companion::config::credentials_from_env;
use movie_companion::provider::ProviderKind;
use movie_companion::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "ask")]
#[command(about = "Ask a spoiler-free question about a title at a playback position")]
struct Cli {
    #[arg(long)]
    title: String,
    /// Path to an SRT subtitle file.
    #[arg(long)]
    subtitles: PathBuf,
    /// Seconds or HH:MM:SS.
    #[arg(long)]
    timestamp: String,
    #[arg(long)]
    question: String,
    /// cloud-chat (openai), local-http (ollama) or cloud-rest (groq).
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    max_output_tokens: Option<u32>,
    /// Previously watched entry; repeat for several.
    #[arg(long = "watched")]
    watched: Vec<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    history: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let app = AppConfig::from_env().context("invalid configuration")?;

    let mut config = CompanionConfig::from(&app);
    if let Some(name) = cli.provider.as_deref() {
        config.provider.provider = name.parse::<ProviderKind>()?;
    }
    if let Some(model) = cli.model {
        config.provider.model = model;
    }
    if let Some(temperature) = cli.temperature {
        config.provider.temperature = temperature;
    }
    if let Some(max_output_tokens) = cli.max_output_tokens {
        config.provider.max_output_tokens = max_output_tokens;
    }
    if let Some(history) = cli.history {
        config.history_path = history;
    }

    let credentials = match config.provider.provider {
        ProviderKind::CloudChat => credentials_from_env(cli.api_key, None),
        ProviderKind::CloudRest => credentials_from_env(None, cli.api_key),
        ProviderKind::LocalHttp => app.credentials.clone(),
    };

    let companion = MovieCompanion::new(config, &credentials)?;
    let watched = (!cli.watched.is_empty()).then_some(cli.watched.as_slice());
    let answer = companion
        .answer_question(
            &cli.title,
            &cli.subtitles,
            cli.timestamp.as_str(),
            &cli.question,
            watched,
        )
        .with_context(|| format!("failed to answer question about {}", cli.title))?;

    println!("{answer}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
