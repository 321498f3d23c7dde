//! Model catalog commands for FalLab
//!
//! This module provides the `models` subcommands: listing models by
//! category, searching, listing categories, showing details for one model,
//! and asking the backend to refresh its catalog.

use prettytable::{row, Table};

use crate::api::Model;
use crate::catalog::{LoadOutcome, ModelCatalog, View};
use crate::commands::api_client;
use crate::config::Config;
use crate::error::{FallabError, Result};

/// List models, optionally restricted to one category
///
/// # Examples
///
/// ```no_run
/// use fallab::config::Config;
/// use fallab::commands::models::list_models;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load("config/config.yaml", &Default::default())?;
/// list_models(&config, Some("text-to-image"), false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn list_models(config: &Config, category: Option<&str>, json: bool) -> Result<()> {
    tracing::info!("Listing models: category={:?}", category);
    let catalog = ModelCatalog::new(api_client(config)?, config.catalog.clone());

    let view = match category {
        Some(c) => View::Category(c.to_string()),
        None => View::All,
    };
    let models = applied_models(catalog.load_models(view).await);

    if json {
        return output_json(&models);
    }
    if models.is_empty() {
        println!("No models found");
        return Ok(());
    }

    let heading = match category {
        Some(c) => format!("Models in {}", c),
        None => "Available models".to_string(),
    };
    output_models_table(&models, &heading);
    Ok(())
}

/// Search models by name, capability, or description
pub async fn search_models(config: &Config, query: &str, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        return Err(FallabError::Validation("search query cannot be empty".to_string()).into());
    }

    tracing::info!("Searching models: query={}", query);
    let catalog = ModelCatalog::new(api_client(config)?, config.catalog.clone());
    let models = applied_models(catalog.search(query).await);

    if json {
        return output_json(&models);
    }
    if models.is_empty() {
        println!("No models match '{}'", query);
        return Ok(());
    }

    output_models_table(&models, &format!("Search results for '{}'", query));
    Ok(())
}

/// List model categories
pub async fn list_categories(config: &Config, json: bool) -> Result<()> {
    let catalog = ModelCatalog::new(api_client(config)?, config.catalog.clone());
    let categories = catalog.load_categories().await;

    if json {
        return output_json(&categories);
    }
    if categories.is_empty() {
        println!("No categories available");
        return Ok(());
    }

    println!("\nCategories:\n");
    for category in &categories {
        println!("  {}", category);
    }
    println!();
    Ok(())
}

/// Show details for one model
///
/// Unknown ids get a "did you mean" hint when a close match exists.
pub async fn show_model_info(config: &Config, model_id: &str, json: bool) -> Result<()> {
    let api = api_client(config)?;
    tracing::info!("Getting model info for '{}'", model_id);

    let model = match api.get_model(model_id).await {
        Ok(model) => model,
        Err(e) => {
            let catalog = ModelCatalog::new(api, config.catalog.clone());
            if let Some(suggestion) = catalog.suggest(model_id).await {
                println!("Model '{}' not found. Did you mean '{}'?", model_id, suggestion);
            }
            return Err(e);
        }
    };

    if json {
        return output_json(&model);
    }
    output_model_detailed(&model);
    Ok(())
}

/// Ask the backend to reload its model catalog
pub async fn refresh_models(config: &Config) -> Result<()> {
    let catalog = ModelCatalog::new(api_client(config)?, config.catalog.clone());
    let response = catalog.refresh().await?;
    println!("{} ({} models)", response.message, response.total_models);
    Ok(())
}

fn applied_models(outcome: LoadOutcome) -> Vec<Model> {
    match outcome {
        LoadOutcome::Applied(models) => models,
        LoadOutcome::Superseded => Vec::new(),
    }
}

/// Serialize a value into pretty JSON and print it
///
/// # Errors
///
/// Returns `FallabError::Serialization` if serialization fails
fn output_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(FallabError::Serialization)?;
    println!("{}", json);
    Ok(())
}

fn models_table(models: &[Model]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Endpoint ID", "Name", "Category", "Status", "Tags"]);

    for model in models {
        let name = if model.metadata.pinned == Some(true) {
            format!("* {}", model.metadata.display_name)
        } else {
            model.metadata.display_name.clone()
        };
        table.add_row(row![
            model.endpoint_id,
            name,
            model.metadata.category,
            model.metadata.status,
            format_tags(&model.metadata.tags)
        ]);
    }
    table
}

fn output_models_table(models: &[Model], heading: &str) {
    println!("\n{} ({}):\n", heading, models.len());
    models_table(models).printstd();
    println!();
}

fn format_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        "-".to_string()
    } else {
        tags.join(", ")
    }
}

fn output_model_detailed(model: &Model) {
    let meta = &model.metadata;
    println!("\nModel Information ({})\n", meta.display_name);
    println!("Endpoint ID:     {}", model.endpoint_id);
    println!("Category:        {}", meta.category);
    println!("Status:          {}", meta.status);
    println!("Tags:            {}", format_tags(&meta.tags));

    if let Some(description) = &meta.description {
        println!("Description:     {}", description);
    }
    if let Some(license) = &meta.license_type {
        println!("License:         {}", license);
    }
    if let Some(estimate) = meta.duration_estimate {
        println!("Typical time:    {:.1}s", estimate);
    }
    if let Some(url) = &meta.model_url {
        println!("Docs:            {}", url);
    }

    if !meta.extra.is_empty() {
        println!("\nAdditional Metadata:");
        for (key, value) in &meta.extra {
            println!("  {}: {}", key, value);
        }
    }
    println!();
}
