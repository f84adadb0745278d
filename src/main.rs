use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use knowledge_curator::engine::llm_client::OllamaClient;
use knowledge_curator::model::run_artifacts::RunArtifacts;
use knowledge_curator::{CuratorConfig, Engine};

#[derive(Parser)]
#[command(
    name = "knowledge_curator",
    about = "Research a topic through a writer/expert dialogue and write an article about it",
    version
)]
struct Cli {
    /// Topic to research; asked for on stdin when omitted
    #[arg(short, long)]
    topic: Option<String>,

    /// Perspective to research from (repeatable)
    #[arg(short, long = "persona")]
    personas: Vec<String>,

    /// Override the number of curation turns
    #[arg(long)]
    max_turns: Option<usize>,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "CURATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = CuratorConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(max_turns) = cli.max_turns {
        config.curation.max_turns = max_turns;
    }

    let topic = match cli.topic {
        Some(topic) => topic,
        None => prompt_topic()?,
    };
    if topic.trim().is_empty() {
        bail!("a topic is required");
    }

    let client = OllamaClient::from_config(&config.generation)
        .context("creating generation client")?;
    tracing::info!(endpoint = client.endpoint(), model = %config.generation.model, "generation client ready");
    let mut engine = Engine::new(&config, Rc::new(client));

    let artifacts = engine
        .run_pipeline(&topic, &cli.personas)
        .context("running curation pipeline")?;

    print_artifacts(&artifacts);
    write_artifacts(&config.output.dir, &artifacts)?;

    Ok(())
}

fn prompt_topic() -> Result<String> {
    print!("Topic: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_artifacts(artifacts: &RunArtifacts) {
    println!("=== Conversation ===");
    for turn in &artifacts.conversation {
        println!("{}: {}", turn.role, turn.utterance);
    }

    println!("\n=== Outline ===");
    println!("{}", artifacts.outline.as_deref().unwrap_or("(no outline)"));

    println!("\n=== Article ===");
    println!("{}", artifacts.article.as_deref().unwrap_or("(no article)"));

    println!("\n=== Polished article ===");
    println!(
        "{}",
        artifacts.polished_article.as_deref().unwrap_or("(no polished article)")
    );
}

fn write_artifacts(dir: &Path, artifacts: &RunArtifacts) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let conversation = serde_json::to_string_pretty(&artifacts.conversation)?;
    fs::write(dir.join("conversation.json"), conversation)?;

    if let Some(outline) = &artifacts.outline {
        fs::write(dir.join("outline.txt"), outline)?;
    }
    if let Some(article) = artifacts.final_article() {
        fs::write(dir.join("article.txt"), article)?;
    }

    match artifacts.structured_article() {
        Some(Ok(record)) => {
            let json = serde_json::to_string_pretty(&record)?;
            fs::write(dir.join("article.json"), json)?;
        }
        Some(Err(e)) => {
            tracing::info!(stage = e.stage.as_str(), "article is not structured JSON, kept as text only");
        }
        None => {}
    }

    tracing::info!(dir = %dir.display(), "artifacts written");
    Ok(())
}
