//! Room staging CLI tool
//!
//! Stages a single room photo (local path or URL) and prints the stored
//! design's URL.

use super::config::CliConfigBuilder;
use crate::config::StagingConfig;
use crate::orchestrator::ProviderState;
use crate::pipeline::StagingPipeline;
use crate::providers::{build_http_client, GeminiClient};
use crate::style::Style;
use crate::types::StagingInput;
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

/// AI room staging CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "roomstage")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Room photo: local path or http(s) URL
    #[arg(value_name = "IMAGE")]
    pub input: Option<String>,

    /// Interior style (e.g. modern, scandinavian, "mid-century modern")
    #[arg(short, long, default_value = "modern")]
    pub style: String,

    /// Extra refinement text appended to the staging prompt
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Ask for additional furniture and decor
    #[arg(long)]
    pub more_furniture: bool,

    /// Use the local mock renderer regardless of configured keys
    #[arg(long)]
    pub mock: bool,

    /// Skip the coherence pass and render once
    #[arg(long)]
    pub single_pass: bool,

    /// Single-pass strength in (0, 1]
    #[arg(long)]
    pub strength: Option<f32>,

    /// Directory designs are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// URL prefix the output directory is served from
    #[arg(long, value_name = "URL")]
    pub public_url: Option<String>,

    /// Write mask debug artifacts to this directory (development only)
    #[arg(long, value_name = "DIR")]
    pub debug_artifacts: Option<PathBuf>,

    /// Print the full outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show which provider path the current credentials select and exit
    #[arg(long)]
    pub show_providers: bool,

    /// List text models available to the planner key and exit
    #[arg(long)]
    pub list_models: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing = crate::tracing_config::init_cli_tracing(cli.verbose)
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let base = StagingConfig::from_env().context("Failed to read configuration from environment")?;
    let config = CliConfigBuilder::from_cli(&cli, base)?;

    if cli.show_providers {
        show_providers(&config);
        return Ok(());
    }
    if cli.list_models {
        return list_models(&config).await;
    }

    let input = cli
        .input
        .clone()
        .context("An input image path or URL is required")?;
    let pipeline = StagingPipeline::from_config(&config).context("Failed to build pipeline")?;
    info!(
        "Staging {} as {} via {}",
        input,
        cli.style,
        pipeline.provider_state()
    );

    let mut request = StagingInput::new(input, cli.style.clone()).with_more_furniture(cli.more_furniture);
    if let Some(prompt) = &cli.prompt {
        request = request.with_prompt(prompt.clone());
    }

    let spinner = create_spinner(cli.json);
    let outcome = pipeline.generate_staged_design(request).await;
    spinner.finish_and_clear();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.success {
        println!("Staged design: {}", outcome.image_url.as_deref().unwrap_or_default());
        println!(
            "Provider: {}{}",
            outcome.provider_used.map_or("unknown", |p| p.as_str()),
            if outcome.fallback_used { " (fallback)" } else { "" }
        );
        println!("Planner: {}", outcome.planner_used);
        if outcome.low_confidence {
            println!("Note: a stage degraded; review the result before publishing");
        }
    }

    if !outcome.success {
        anyhow::bail!(
            "{} [{}] (request {}{})",
            outcome.error_message.as_deref().unwrap_or("staging failed"),
            outcome.error_code.map_or("UNKNOWN", |c| c.as_str()),
            outcome.request_id,
            if outcome.retryable { ", retryable" } else { "" }
        );
    }
    Ok(())
}

fn create_spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Staging room...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn show_providers(config: &StagingConfig) {
    let presence = config.credentials.presence();
    let state = ProviderState::select(presence, config.force_mock);
    let mark = |present: bool| if present { "configured" } else { "missing" };

    println!("Provider configuration");
    println!("  renderer (STABILITY_API_KEY): {}", mark(presence.renderer));
    println!("  editor   (OPENAI_API_KEY):    {}", mark(presence.editor));
    println!("  planner  (GEMINI_API_KEY):    {}", mark(presence.planner));
    println!();
    println!("Selected path: {}", state);
    if state == ProviderState::NoProvider {
        if config.mock_fallback_permitted() {
            println!("  no provider keys; the mock renderer will be used (development)");
        } else {
            println!("  no provider keys; requests will fail with MISSING_PROVIDER_KEY");
        }
    }
    println!(
        "Mode: {}",
        if config.two_pass { "two-pass" } else { "single-pass" }
    );
    println!("Environment: {:?}", config.environment);
    println!();
    println!("Known styles: {}", Style::KNOWN.iter().map(Style::slug).collect::<Vec<_>>().join(", "));
}

async fn list_models(config: &StagingConfig) -> Result<()> {
    let key = config.credentials.gemini_key()?;
    let client = GeminiClient::new(
        build_http_client(config.request_timeout())?,
        key.to_string(),
        &config.gemini_text_model,
    );
    let models = client.list_models().await?;

    println!("Planner models (configured: {})", config.gemini_text_model);
    for model in models.iter().filter(|m| m.supports("generateContent")) {
        println!("  {} - {}", model.short_name, model.display_name);
    }
    Ok(())
}
