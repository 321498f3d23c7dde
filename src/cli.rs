//! Command-line interface definition for FalLab
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for health checks, model browsing, one-shot
//! generation, and interactive chat.

use clap::{Parser, Subcommand};

/// FalLab - browse generative-media models and run prompts
#[derive(Parser, Debug, Clone)]
#[command(name = "fallab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the API base URL (e.g. http://localhost:8000/api/v1)
    #[arg(long, env = "FALLAB_API_URL")]
    pub api_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for FalLab
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check backend health
    Health {
        /// Print the raw health payload as JSON
        #[arg(long)]
        json: bool,
    },

    /// Browse the model catalog
    Models {
        /// Model catalog subcommand
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// Submit one prompt and wait for the result
    Generate {
        /// Model endpoint id (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,

        /// Generation prompt
        #[arg(short, long)]
        prompt: String,

        /// Extra model parameters as key=value (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Print the final status payload as JSON
        #[arg(long)]
        json: bool,

        /// Use the blocking /generate/sync endpoint instead of polling
        #[arg(long)]
        sync: bool,
    },

    /// Start an interactive chat session
    Chat {
        /// Model endpoint id (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,
    },
}

/// Model catalog subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ModelCommand {
    /// List models, optionally within one category
    List {
        /// Category to list
        #[arg(short, long)]
        category: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search models by name, capability, or description
    Search {
        /// Search query
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List model categories
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show details for one model
    Info {
        /// Model endpoint id
        model: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the backend to refresh its model cache
    Refresh,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            api_url: None,
            command: Commands::Health { json: false },
        }
    }
}
