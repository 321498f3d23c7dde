//! FalLab API abstraction and implementations
//!
//! This module defines the [`ApiClient`] trait, the single fetch
//! collaborator shared by the model catalog and the generation client.
//! Concrete implementations live in submodules:
//!
//! - [`http::HttpApiClient`] -- talks to the FalLab backend over HTTP/JSON.
//! - `fake::ScriptedApi` -- scripted in-process fake used in unit tests
//!   (cfg(test) only).
//!
//! # Design
//!
//! One method per endpoint, each returning a strictly typed payload from
//! [`types`]. Implementations never retry; `/generate` in particular must be
//! called at most once per logical submission.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

pub mod http;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use http::HttpApiClient;
pub use types::{
    first_image_url, CategoryList, GenerateRequest, GenerateResponse, GenerationOutcome,
    GenerationStatus, HealthResponse, Model, ModelMetadata, ModelsPage, RedisHealth,
    RefreshResponse, SearchResults, StatusResponse,
};

/// Abstraction over the FalLab HTTP API
///
/// Used polymorphically through `Arc<dyn ApiClient>` so tests can swap in a
/// scripted fake.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// `GET /health`
    async fn health(&self) -> Result<HealthResponse>;

    /// `GET /health/ready`
    ///
    /// `Ok(false)` when the backend answers but is not ready to serve.
    async fn readiness(&self) -> Result<bool>;

    /// `GET /health/live`
    async fn liveness(&self) -> Result<bool>;

    /// `GET /models` with paging and an optional category filter
    async fn list_models(
        &self,
        limit: u32,
        skip: u32,
        category: Option<&str>,
    ) -> Result<ModelsPage>;

    /// `GET /models/search`
    async fn search_models(&self, query: &str, limit: u32) -> Result<SearchResults>;

    /// `GET /models/categories`
    async fn list_categories(&self) -> Result<CategoryList>;

    /// `GET /models/{model_id}`
    async fn get_model(&self, model_id: &str) -> Result<Model>;

    /// `POST /models/refresh`
    async fn refresh_models(&self) -> Result<RefreshResponse>;

    /// `POST /generate`
    ///
    /// Submits exactly one request; implementations must not retry.
    async fn submit_generation(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<GenerateResponse>;

    /// `POST /generate/sync`
    ///
    /// Blocks until the backend has a terminal result and returns it in the
    /// `/status` shape. Submits exactly once, like [`submit_generation`].
    ///
    /// [`submit_generation`]: ApiClient::submit_generation
    async fn submit_generation_sync(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<StatusResponse>;

    /// `GET /status/{request_id}`
    async fn generation_status(&self, request_id: &str) -> Result<StatusResponse>;
}
