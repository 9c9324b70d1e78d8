use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{ApiConfig, Config, ConfigError};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 chapter-rag Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("API Configuration").bold().yellow());
    eprintln!("Configure the OpenAI-compatible endpoint used for embeddings and answers.");
    eprintln!();

    configure_api(&mut config.api)?;
    configure_models(&mut config)?;
    configure_pipeline(&mut config)?;

    eprintln!();
    match config.api.api_key() {
        Ok(_) => eprintln!(
            "{}",
            style(format!("✓ {} is set", config.api.api_key_env)).green()
        ),
        Err(e) => {
            eprintln!("{}", style(format!("⚠ Warning: {}", e)).yellow());
            eprintln!("Export it before indexing or asking questions.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("API Settings:").bold().yellow());
    match config.api.base_url() {
        Ok(url) => eprintln!("  Base URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Base URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  API key variable: {}", style(&config.api.api_key_env).cyan());
    eprintln!("  Timeout: {}s", style(config.api.timeout_seconds).cyan());
    eprintln!("  Retry attempts: {}", style(config.api.retry_attempts).cyan());

    eprintln!();
    eprintln!("{}", style("Models:").bold().yellow());
    eprintln!("  Embedding: {}", style(&config.embedding.model).cyan());
    if let Some(dimensions) = config.embedding.dimensions {
        eprintln!("  Embedding dimensions: {}", style(dimensions).cyan());
    }
    eprintln!("  Generation: {}", style(&config.generation.model).cyan());

    eprintln!();
    eprintln!("{}", style("Pipeline:").bold().yellow());
    eprintln!(
        "  Max segment length: {} characters",
        style(config.segmenting.max_segment_length).cyan()
    );
    eprintln!("  Passages per question: {}", style(config.retrieval.top_k).cyan());

    eprintln!();
    eprintln!("{}", style("Files:").bold().yellow());
    eprintln!("  Corpus: {}", style(config.corpus_path().display()).cyan());
    eprintln!("  Embeddings: {}", style(config.embeddings_path().display()).cyan());
    eprintln!("  Index: {}", style(config.index_path().display()).cyan());
    eprintln!("  Metadata: {}", style(config.metadata_path().display()).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).unwrap_or_else(|_| {
        eprintln!(
            "{}",
            style("No valid configuration found. Using defaults.").yellow()
        );
        Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        }
    })
}

fn configure_api(api: &mut ApiConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(api.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = ApiConfig {
                base_url: input.clone(),
                ..api.clone()
            };
            candidate.validate()
        })
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(api.api_key_env.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Variable name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout_seconds: u64 = Input::new()
        .with_prompt("Request timeout in seconds")
        .default(api.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    api.set_base_url(base_url)?;
    api.api_key_env = api_key_env;
    api.set_timeout_seconds(timeout_seconds)?;

    Ok(())
}

fn configure_models(config: &mut Config) -> Result<()> {
    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.embedding.model.clone())
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model")
        .default(config.generation.model.clone())
        .interact_text()?;

    config.embedding.set_model(embedding_model)?;
    config.generation.set_model(generation_model)?;

    Ok(())
}

fn configure_pipeline(config: &mut Config) -> Result<()> {
    let max_segment_length: usize = Input::new()
        .with_prompt("Max segment length (characters)")
        .default(config.segmenting.max_segment_length)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Segment length must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Passages retrieved per question")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;

    config.segmenting.max_segment_length = max_segment_length;
    config.retrieval.top_k = top_k;

    Ok(())
}
