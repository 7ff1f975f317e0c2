
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, ConfigError, EmbeddingConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Storefront Search Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Embedding Service").bold().yellow());
    eprintln!("Configure the hosted embedding model used for products and queries.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match config.embedding.api_key() {
        Ok(_) if test_embedding_connection(&config.embedding) => {
            eprintln!("{}", style("✓ Embedding service reachable!").green());
        }
        Ok(_) => {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not reach the embedding service").yellow()
            );
            eprintln!("You can continue, but ingestion and search will fail until it is reachable.");
        }
        Err(e) => {
            eprintln!("{}", style(format!("⚠ Warning: {}", e)).yellow());
            eprintln!("Export the key before running ingestion or search.");
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
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Timeout: {}s", style(config.embedding.timeout_secs).cyan());
    let key_state = if config.embedding.api_key().is_ok() {
        style("set").green()
    } else {
        style("missing").red()
    };
    eprintln!(
        "  API key: ${} ({})",
        style(&config.embedding.api_key_env).cyan(),
        key_state
    );

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    eprintln!(
        "  Similarity floor: {}",
        style(config.search.similarity_floor).cyan()
    );
    eprintln!(
        "  Resource search limit: {}",
        style(config.search.resource_limit).cyan()
    );
    eprintln!(
        "  Tool default limit: {}",
        style(config.search.tool_default_limit).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Indexing Settings:").bold().yellow());
    eprintln!(
        "  Resource type: {}",
        style(&config.indexing.resource_type).cyan()
    );
    eprintln!(
        "  Delay between items: {}ms",
        style(config.indexing.item_delay_ms).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!("Database: {}", style(config.database_path().display()).dim());

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Embedding API base URL")
        .default(embedding.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = EmbeddingConfig {
                base_url: input.clone(),
                ..EmbeddingConfig::default()
            };
            temp_config.endpoint_url()?;
            Ok(())
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 || *input > 8192 {
                Err("Dimension must be between 1 and 8192")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(embedding.api_key_env.clone())
        .interact_text()?;

    embedding.set_base_url(base_url)?;
    embedding.set_model(model)?;
    embedding.set_dimension(dimension)?;
    embedding.set_api_key_env(api_key_env)?;

    Ok(())
}

fn test_embedding_connection(embedding: &EmbeddingConfig) -> bool {
    let Ok(url) = embedding
        .endpoint_url()
        .and_then(|base| base.join("models").map_err(|e| ConfigError::InvalidUrl(e.to_string())))
    else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    let mut request = agent.get(url.as_str());
    if let Ok(key) = embedding.api_key() {
        request = request.header("Authorization", &format!("Bearer {}", key));
    }

    match request.call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
