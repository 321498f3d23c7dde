//! HTTP implementation of the FalLab API client
//!
//! Talks JSON to the FalLab backend with `reqwest`. Non-success responses
//! become [`FallabError::Api`] carrying the server's `detail` (or `message`)
//! text; transport failures surface as [`FallabError::Http`].

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::api::types::{
    CategoryList, GenerateRequest, GenerateResponse, HealthResponse, Model, ModelsPage,
    RefreshResponse, SearchResults, StatusResponse,
};
use crate::api::ApiClient;
use crate::config::ApiConfig;
use crate::error::{FallabError, Result};

/// FalLab API client over HTTP
///
/// # Examples
///
/// ```no_run
/// use fallab::api::{ApiClient, HttpApiClient};
/// use fallab::config::ApiConfig;
///
/// # async fn example() -> fallab::error::Result<()> {
/// let client = HttpApiClient::new(&ApiConfig::default())?;
/// let health = client.health().await?;
/// println!("backend is {}", health.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: Url,
}

impl HttpApiClient {
    /// Create a client from API configuration
    ///
    /// # Errors
    ///
    /// Returns `FallabError::Config` if the base URL does not parse, or
    /// `FallabError::Http` if the HTTP client cannot be built
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            FallabError::Config(format!("Invalid API base URL {}: {}", config.base_url, e))
        })?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(FallabError::Http)?;

        tracing::info!("Initialized FalLab API client: base_url={}", base_url);

        Ok(Self { client, base_url })
    }

    /// Create a client pointing at `base_url` with default settings
    ///
    /// Convenience for tests and one-off tools.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Self::new(&ApiConfig {
            base_url: base_url.to_string(),
            timeout_seconds: 10,
            ..ApiConfig::default()
        })
    }

    /// The configured base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL by appending percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                FallabError::Config(format!("API base URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url.clone()).query(query).send().await.map_err(|e| {
            tracing::warn!("Request to {} failed: {}", url, e);
            FallabError::Http(e)
        })?;
        read_json(response).await
    }

    async fn post_generation<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let body = GenerateRequest {
            model_id: model_id.to_string(),
            prompt: prompt.to_string(),
            parameters,
        };

        tracing::debug!("POST {} model_id={}", url, model_id);
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to submit generation: {}", e);
                FallabError::Http(e)
            })?;
        read_json(response).await
    }

    /// Fetch a readiness or liveness endpoint and read its boolean flag
    ///
    /// A 503 is the backend saying "no" rather than an error.
    async fn health_check(&self, segments: &[&str], flag: &str) -> Result<bool> {
        let url = self.endpoint(segments)?;
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FallabError::Http)?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(false);
        }
        let value: Value = read_json(response).await?;
        Ok(health_flag(&value, flag).unwrap_or(false))
    }
}

/// Read `flag` from a readiness or liveness body
///
/// Accepts a plain object or a `[object, status]` pair, which is what the
/// backend emits when it returns a tuple from a handler.
fn health_flag(value: &Value, flag: &str) -> Option<bool> {
    let object = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    object.get(flag)?.as_bool()
}

/// Decode a successful response body, or convert an error status to
/// `FallabError::Api`
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(FallabError::Http)?;

    if !status.is_success() {
        let message = error_message(&body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.clone()
            }
        });
        tracing::error!("API returned error {}: {}", status, message);
        return Err(FallabError::Api {
            status: status.as_u16(),
            message,
        }
        .into());
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!("Failed to parse API response: {}", e);
        FallabError::Serialization(e).into()
    })
}

/// Extract a human-readable message from an error body
///
/// Understands `{"detail": ...}`, `{"message": ...}` and `{"error": ...}`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn health(&self) -> Result<HealthResponse> {
        self.get_json(self.endpoint(&["health"])?, &[]).await
    }

    async fn readiness(&self) -> Result<bool> {
        self.health_check(&["health", "ready"], "ready").await
    }

    async fn liveness(&self) -> Result<bool> {
        self.health_check(&["health", "live"], "alive").await
    }

    async fn list_models(
        &self,
        limit: u32,
        skip: u32,
        category: Option<&str>,
    ) -> Result<ModelsPage> {
        let mut query = vec![("limit", limit.to_string()), ("skip", skip.to_string())];
        if let Some(category) = category {
            query.push(("category", category.to_string()));
        }
        self.get_json(self.endpoint(&["models"])?, &query).await
    }

    async fn search_models(&self, query: &str, limit: u32) -> Result<SearchResults> {
        self.get_json(
            self.endpoint(&["models", "search"])?,
            &[("q", query.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn list_categories(&self) -> Result<CategoryList> {
        self.get_json(self.endpoint(&["models", "categories"])?, &[])
            .await
    }

    async fn get_model(&self, model_id: &str) -> Result<Model> {
        self.get_json(self.endpoint(&["models", model_id])?, &[])
            .await
    }

    async fn refresh_models(&self) -> Result<RefreshResponse> {
        let url = self.endpoint(&["models", "refresh"])?;
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(FallabError::Http)?;
        read_json(response).await
    }

    async fn submit_generation(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<GenerateResponse> {
        self.post_generation(&["generate"], model_id, prompt, parameters)
            .await
    }

    async fn submit_generation_sync(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<StatusResponse> {
        self.post_generation(&["generate", "sync"], model_id, prompt, parameters)
            .await
    }

    async fn generation_status(&self, request_id: &str) -> Result<StatusResponse> {
        self.get_json(self.endpoint(&["status", request_id])?, &[])
            .await
    }
}
