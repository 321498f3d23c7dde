//! FalLab - generative-media model client library
//!
//! This library provides the core of the FalLab CLI: a typed client for the
//! FalLab HTTP API, a cached and debounced model catalog, a generation
//! client that submits and polls requests, and a multi-session conversation
//! store that runs generations in the background.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `api`: `ApiClient` trait, wire types, and the HTTP implementation
//! - `catalog`: Model catalog with category/search views and caching
//! - `generation`: Submission and status polling
//! - `conversation`: Sessions, messages, and background generations
//! - `metrics`: Generation metrics
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Command handlers used by the binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fallab::api::HttpApiClient;
//! use fallab::{Config, ConversationStore, GenerationClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let api = Arc::new(HttpApiClient::new(&config.api)?);
//!     let store = ConversationStore::new(GenerationClient::new(api), &config.generation);
//!     let session = store.create_session();
//!     store.append_user_message(&session, "a red fox in the snow")?;
//!     store.start_generation(&session, &config.generation.default_model, "a red fox in the snow")?;
//!     store.wait_until_settled(&session).await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod metrics;

// Re-export commonly used types
pub use catalog::ModelCatalog;
pub use config::Config;
pub use conversation::ConversationStore;
pub use error::{FallabError, Result};
pub use generation::GenerationClient;
