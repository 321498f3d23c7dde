//! Request and response shapes for the FalLab HTTP API
//!
//! Every endpoint gets its own strictly typed payload. Loosely structured
//! parts of a response (model-specific generation results, unknown model
//! metadata) stay as `serde_json` values, but the fields the client depends
//! on are always typed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lifecycle status of a generation request
///
/// `Submitted` is the client-side status of a placeholder before the
/// remote service has acknowledged it; the API reports the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    /// Accepted by the client, not yet acknowledged remotely
    #[default]
    Submitted,
    /// Waiting in the remote queue
    Queued,
    /// Being processed by the model
    Processing,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

impl GenerationStatus {
    /// Returns true for `Completed` and `Failed`
    ///
    /// # Examples
    ///
    /// ```
    /// use fallab::api::GenerationStatus;
    ///
    /// assert!(GenerationStatus::Completed.is_terminal());
    /// assert!(!GenerationStatus::Queued.is_terminal());
    /// ```
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redis connectivity reported by `/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisHealth {
    /// Whether the backend reached Redis
    #[serde(default)]
    pub connected: bool,
    /// Round-trip latency when connected
    #[serde(default)]
    pub latency_ms: Option<f64>,
}

/// Response from `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status, e.g. `healthy` or `degraded`
    pub status: String,
    /// Server time of the check
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Backend version
    #[serde(default)]
    pub version: Option<String>,
    /// Redis connectivity details
    #[serde(default)]
    pub redis: Option<RedisHealth>,
    /// Per-service status map
    #[serde(default)]
    pub services: Option<Map<String, Value>>,
}

impl HealthResponse {
    /// True when the backend reports itself fully healthy
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Descriptive metadata for one catalog model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Human-readable model name
    pub display_name: String,
    /// Catalog category (e.g. `text-to-image`)
    pub category: String,
    /// Optional long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Availability status reported by the catalog
    #[serde(default)]
    pub status: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the catalog pins this model to the top
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Whether the catalog highlights this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted: Option<bool>,
    /// Preview image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Model documentation page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    /// License identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    /// Typical generation duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_estimate: Option<f64>,
    /// Any metadata fields this client does not model explicitly
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Endpoint id used as `model_id` when submitting
    pub endpoint_id: String,
    /// Descriptive metadata
    pub metadata: ModelMetadata,
}

impl Model {
    /// True when `query` appears in the id, name, description, or tags
    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.endpoint_id.to_lowercase().contains(&q)
            || self.metadata.display_name.to_lowercase().contains(&q)
            || self
                .metadata
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&q))
                .unwrap_or(false)
            || self
                .metadata
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&q))
    }
}

/// Response from `GET /models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsPage {
    /// Models on this page
    pub models: Vec<Model>,
    /// Total models matching the filter
    #[serde(default)]
    pub total: u64,
    /// Cursor for the next page, absent on the last page
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Response from `GET /models/search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Matching models
    pub models: Vec<Model>,
    /// Total matches
    #[serde(default)]
    pub total: u64,
    /// Query echoed back by the server
    #[serde(default)]
    pub query: Option<String>,
}

/// Response from `GET /models/categories`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryList {
    /// Category names in catalog order
    pub categories: Vec<String>,
    /// Number of categories
    #[serde(default)]
    pub total: u64,
}

/// Response from `POST /models/refresh`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// Outcome of the refresh
    pub status: String,
    /// Models in the refreshed catalog
    #[serde(default)]
    pub total_models: u64,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// Body of `POST /generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model endpoint id
    pub model_id: String,
    /// Generation prompt
    pub prompt: String,
    /// Model-specific parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

/// Response from `POST /generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Id used to poll `/status/{request_id}`
    pub request_id: String,
    /// Initial status; absent means the request was only just submitted
    #[serde(default)]
    pub status: Option<GenerationStatus>,
    /// Model the request was submitted to
    #[serde(default)]
    pub model_id: Option<String>,
    /// Server-side creation time
    #[serde(default)]
    pub created_at: Option<String>,
    /// Position in the remote queue
    #[serde(default)]
    pub queue_position: Option<u64>,
}

/// Response from `GET /status/{request_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Request being reported on
    pub request_id: String,
    /// Current lifecycle status
    pub status: GenerationStatus,
    /// Model-specific result payload once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error description once failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Position in the remote queue while queued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    /// Server-side completion time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Terminal result of a generation, tagged by success or failure
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// The model produced a result
    Completed {
        /// First image (or output) URL found in the result
        image_url: Option<String>,
        /// Full result payload
        result: Value,
    },
    /// The remote service reported a failure
    Failed {
        /// Error description from the service
        error: String,
    },
}

impl StatusResponse {
    /// Converts a terminal status payload into a tagged outcome
    ///
    /// Returns `None` while the request is still in flight.
    pub fn outcome(&self) -> Option<GenerationOutcome> {
        match self.status {
            GenerationStatus::Completed => {
                let result = self.result.clone().unwrap_or(Value::Null);
                Some(GenerationOutcome::Completed {
                    image_url: first_image_url(&result),
                    result,
                })
            }
            GenerationStatus::Failed => Some(GenerationOutcome::Failed {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "Generation failed".to_string()),
            }),
            _ => None,
        }
    }
}

/// Finds the first image URL in a model result payload
///
/// Looks at `images[0].url`, then the first `output` entry (a bare URL or an
/// object with `url`), then `image.url`.
///
/// # Examples
///
/// ```
/// use fallab::api::first_image_url;
/// use serde_json::json;
///
/// let result = json!({"images": [{"url": "http://x/img.png"}]});
/// assert_eq!(first_image_url(&result).as_deref(), Some("http://x/img.png"));
///
/// let result = json!({"output": ["http://x/out.png"]});
/// assert_eq!(first_image_url(&result).as_deref(), Some("http://x/out.png"));
/// ```
pub fn first_image_url(result: &Value) -> Option<String> {
    fn url_of(entry: &Value) -> Option<String> {
        match entry {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    if let Some(url) = result
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.first())
        .and_then(url_of)
    {
        return Some(url);
    }

    if let Some(url) = match result.get("output") {
        Some(Value::Array(entries)) => entries.first().and_then(url_of),
        Some(other) => url_of(other),
        None => None,
    } {
        return Some(url);
    }

    result.get("image").and_then(url_of)
}
