//! FalLab - generative-media model browser and prompt runner
//!
#![doc = "FalLab - generative-media model browser and prompt runner"]
#![doc = "Main entry point for the FalLab CLI."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fallab::cli::{Cli, Commands, ModelCommand};
use fallab::commands;
use fallab::config::{Config, LoggingConfig};
use fallab::metrics::init_metrics_exporter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration; logging settings come from it
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    init_tracing(&config.logging);
    init_metrics_exporter();

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Health { json } => {
            commands::health::run_health(&config, json).await?;
            Ok(())
        }
        Commands::Models { command } => {
            tracing::info!("Starting model catalog command");
            match command {
                ModelCommand::List { category, json } => {
                    commands::models::list_models(&config, category.as_deref(), json).await?;
                    Ok(())
                }
                ModelCommand::Search { query, json } => {
                    commands::models::search_models(&config, &query, json).await?;
                    Ok(())
                }
                ModelCommand::Categories { json } => {
                    commands::models::list_categories(&config, json).await?;
                    Ok(())
                }
                ModelCommand::Info { model, json } => {
                    commands::models::show_model_info(&config, &model, json).await?;
                    Ok(())
                }
                ModelCommand::Refresh => {
                    commands::models::refresh_models(&config).await?;
                    Ok(())
                }
            }
        }
        Commands::Generate {
            model,
            prompt,
            params,
            json,
            sync,
        } => {
            tracing::info!("Starting one-shot generation");
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }
            commands::generate::run_generate(&config, model, prompt, params, json, sync).await?;
            Ok(())
        }
        Commands::Chat { model } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }
            // Moves `config` into the handler (match arms are exclusive)
            commands::chat::run_chat(config, model).await?;
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fallab={}", logging.level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
