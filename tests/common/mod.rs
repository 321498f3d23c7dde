use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::MockServer;

use fallab::api::{ApiClient, HttpApiClient};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// HTTP client pointed at a mock backend
#[allow(dead_code)]
pub fn api_for(server: &MockServer) -> Arc<dyn ApiClient> {
    Arc::new(HttpApiClient::with_base_url(&server.uri()).expect("valid mock server url"))
}

/// A model entry as the backend serializes it
#[allow(dead_code)]
pub fn model_json(endpoint_id: &str, category: &str) -> Value {
    json!({
        "endpoint_id": endpoint_id,
        "metadata": {
            "display_name": endpoint_id,
            "category": category,
            "description": format!("{} model", category),
            "status": "active",
            "tags": ["fast"],
            "pinned": false
        }
    })
}

#[allow(dead_code)]
pub fn status_json(request_id: &str, status: &str) -> Value {
    json!({
        "request_id": request_id,
        "status": status
    })
}

#[allow(dead_code)]
pub fn completed_json(request_id: &str, image_url: &str) -> Value {
    json!({
        "request_id": request_id,
        "status": "completed",
        "result": {"images": [{"url": image_url, "width": 1024, "height": 768}]},
        "completed_at": "2024-01-01T00:00:05Z"
    })
}
