//! Scripted in-process fake of the FalLab API for unit tests
//!
//! [`ScriptedApi`] answers every [`ApiClient`] call from in-memory scripts
//! and records what it was asked, so tests can assert on call counts,
//! arguments, and the (paused) tokio clock time of each status query.
//!
//! # Status scripts
//!
//! Each request id has a sequence of steps returned on successive
//! `generation_status` calls. Once the script is exhausted the last step
//! repeats, which makes "never terminal" scripts a single `queued` step.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::api::types::{
    CategoryList, GenerateResponse, GenerationStatus, HealthResponse, Model, ModelMetadata,
    ModelsPage, RefreshResponse, SearchResults, StatusResponse,
};
use crate::api::ApiClient;
use crate::error::{FallabError, Result};

/// One scripted answer to a status query
#[derive(Debug, Clone)]
pub enum StatusStep {
    /// Return this payload
    Reply(StatusResponse),
    /// Fail the query with a transport-style error
    Fail(String),
}

/// A recorded submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitCall {
    pub model_id: String,
    pub prompt: String,
    pub parameters: Option<Map<String, Value>>,
}

struct State {
    submit_replies: Vec<std::result::Result<GenerateResponse, String>>,
    submit_calls: Vec<SubmitCall>,
    sync_replies: Vec<std::result::Result<StatusResponse, String>>,
    sync_calls: Vec<SubmitCall>,
    ready: bool,
    status_scripts: HashMap<String, (Vec<StatusStep>, usize)>,
    status_calls: Vec<(String, Instant)>,
    categories: std::result::Result<Vec<String>, String>,
    category_calls: usize,
    models: Vec<Model>,
    list_calls: Vec<Option<String>>,
    fail_listing: bool,
    search_calls: Vec<String>,
    search_delays: HashMap<String, Duration>,
}

/// Scripted fake implementing [`ApiClient`]
pub struct ScriptedApi {
    state: Mutex<State>,
    submit_delay: Mutex<Duration>,
    status_delay: Mutex<Duration>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedApi {
    /// Empty fake: no categories, no models, default submit replies
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                submit_replies: Vec::new(),
                submit_calls: Vec::new(),
                sync_replies: Vec::new(),
                sync_calls: Vec::new(),
                ready: true,
                status_scripts: HashMap::new(),
                status_calls: Vec::new(),
                categories: Ok(Vec::new()),
                category_calls: 0,
                models: Vec::new(),
                list_calls: Vec::new(),
                fail_listing: false,
                search_calls: Vec::new(),
                search_delays: HashMap::new(),
            }),
            submit_delay: Mutex::new(Duration::ZERO),
            status_delay: Mutex::new(Duration::ZERO),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Queue the reply for the next submission
    pub fn push_submit_reply(&self, request_id: &str, status: Option<GenerationStatus>) {
        self.with_state(|s| {
            s.submit_replies.push(Ok(GenerateResponse {
                request_id: request_id.to_string(),
                status,
                model_id: None,
                created_at: None,
                queue_position: None,
            }))
        });
    }

    /// Make the next submission fail
    pub fn push_submit_failure(&self, message: &str) {
        self.with_state(|s| s.submit_replies.push(Err(message.to_string())));
    }

    /// Queue the reply for the next synchronous submission
    pub fn push_sync_reply(&self, reply: StatusResponse) {
        self.with_state(|s| s.sync_replies.push(Ok(reply)));
    }

    /// Make the next synchronous submission fail
    pub fn push_sync_failure(&self, message: &str) {
        self.with_state(|s| s.sync_replies.push(Err(message.to_string())));
    }

    /// Set what the readiness check reports
    pub fn set_ready(&self, ready: bool) {
        self.with_state(|s| s.ready = ready);
    }

    /// Delay every submission by `delay`
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// Delay every status query by `delay`
    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    /// Script bare statuses for `request_id`
    pub fn script_status(&self, request_id: &str, statuses: &[GenerationStatus]) {
        let steps = statuses
            .iter()
            .map(|status| StatusStep::Reply(status_reply(request_id, *status, None, None)))
            .collect();
        self.script_steps(request_id, steps);
    }

    /// Script arbitrary steps for `request_id`
    pub fn script_steps(&self, request_id: &str, steps: Vec<StatusStep>) {
        self.with_state(|s| {
            s.status_scripts
                .insert(request_id.to_string(), (steps, 0));
        });
    }

    /// Set the category list
    pub fn set_categories(&self, categories: &[&str]) {
        self.with_state(|s| {
            s.categories = Ok(categories.iter().map(|c| c.to_string()).collect())
        });
    }

    /// Make the category endpoint fail
    pub fn fail_categories(&self, message: &str) {
        self.with_state(|s| s.categories = Err(message.to_string()));
    }

    /// Make model listing and search fail
    pub fn fail_listing(&self, fail: bool) {
        self.with_state(|s| s.fail_listing = fail);
    }

    /// Add a model to the catalog
    pub fn add_model(&self, endpoint_id: &str, category: &str) {
        self.with_state(|s| s.models.push(sample_model(endpoint_id, category)));
    }

    /// Delay the search for one specific query
    pub fn set_search_delay(&self, query: &str, delay: Duration) {
        self.with_state(|s| {
            s.search_delays.insert(query.to_string(), delay);
        });
    }

    pub fn submit_calls(&self) -> Vec<SubmitCall> {
        self.with_state(|s| s.submit_calls.clone())
    }

    pub fn sync_calls(&self) -> Vec<SubmitCall> {
        self.with_state(|s| s.sync_calls.clone())
    }

    /// Number of status queries issued for `request_id`
    pub fn status_call_count(&self, request_id: &str) -> usize {
        self.with_state(|s| s.status_calls.iter().filter(|(id, _)| id == request_id).count())
    }

    /// Clock times of every status query for `request_id`
    pub fn status_call_times(&self, request_id: &str) -> Vec<Instant> {
        self.with_state(|s| {
            s.status_calls
                .iter()
                .filter(|(id, _)| id == request_id)
                .map(|(_, at)| *at)
                .collect()
        })
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.with_state(|s| s.search_calls.clone())
    }

    pub fn list_calls(&self) -> Vec<Option<String>> {
        self.with_state(|s| s.list_calls.clone())
    }

    pub fn category_calls(&self) -> usize {
        self.with_state(|s| s.category_calls)
    }
}

/// Build a status payload
pub fn status_reply(
    request_id: &str,
    status: GenerationStatus,
    result: Option<Value>,
    error: Option<&str>,
) -> StatusResponse {
    StatusResponse {
        request_id: request_id.to_string(),
        status,
        result,
        error: error.map(str::to_string),
        queue_position: None,
        completed_at: None,
    }
}

/// Build a completed payload with one image
pub fn completed_with_image(request_id: &str, url: &str) -> StatusResponse {
    status_reply(
        request_id,
        GenerationStatus::Completed,
        Some(json!({"images": [{"url": url}]})),
        None,
    )
}

/// Build a minimal catalog model
pub fn sample_model(endpoint_id: &str, category: &str) -> Model {
    Model {
        endpoint_id: endpoint_id.to_string(),
        metadata: ModelMetadata {
            display_name: endpoint_id.to_string(),
            category: category.to_string(),
            description: None,
            status: "active".to_string(),
            tags: Vec::new(),
            pinned: None,
            highlighted: None,
            thumbnail_url: None,
            model_url: None,
            license_type: None,
            duration_estimate: None,
            extra: Map::new(),
        },
    }
}

#[async_trait]
impl ApiClient for ScriptedApi {
    async fn health(&self) -> Result<HealthResponse> {
        Ok(HealthResponse {
            status: "healthy".to_string(),
            timestamp: None,
            version: Some("test".to_string()),
            redis: None,
            services: None,
        })
    }

    async fn readiness(&self) -> Result<bool> {
        Ok(self.with_state(|s| s.ready))
    }

    async fn liveness(&self) -> Result<bool> {
        Ok(true)
    }

    async fn list_models(
        &self,
        limit: u32,
        skip: u32,
        category: Option<&str>,
    ) -> Result<ModelsPage> {
        let (fail, models) = self.with_state(|s| {
            s.list_calls.push(category.map(str::to_string));
            let models: Vec<Model> = s
                .models
                .iter()
                .filter(|m| category.map_or(true, |c| m.metadata.category == c))
                .cloned()
                .collect();
            (s.fail_listing, models)
        });
        if fail {
            return Err(FallabError::Api {
                status: 500,
                message: "listing unavailable".to_string(),
            }
            .into());
        }
        let total = models.len() as u64;
        let page = models
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect();
        Ok(ModelsPage {
            models: page,
            total,
            next_cursor: None,
        })
    }

    async fn search_models(&self, query: &str, limit: u32) -> Result<SearchResults> {
        let (fail, delay) = self.with_state(|s| {
            s.search_calls.push(query.to_string());
            (s.fail_listing, s.search_delays.get(query).copied())
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(FallabError::Api {
                status: 500,
                message: "search unavailable".to_string(),
            }
            .into());
        }
        let models: Vec<Model> = self.with_state(|s| {
            s.models
                .iter()
                .filter(|m| m.matches(query))
                .take(limit as usize)
                .cloned()
                .collect()
        });
        Ok(SearchResults {
            total: models.len() as u64,
            models,
            query: Some(query.to_string()),
        })
    }

    async fn list_categories(&self) -> Result<CategoryList> {
        let categories = self.with_state(|s| {
            s.category_calls += 1;
            s.categories.clone()
        });
        match categories {
            Ok(categories) => Ok(CategoryList {
                total: categories.len() as u64,
                categories,
            }),
            Err(message) => Err(FallabError::Api {
                status: 500,
                message,
            }
            .into()),
        }
    }

    async fn get_model(&self, model_id: &str) -> Result<Model> {
        self.with_state(|s| s.models.iter().find(|m| m.endpoint_id == model_id).cloned())
            .ok_or_else(|| {
                FallabError::Api {
                    status: 404,
                    message: format!("Model '{}' not found", model_id),
                }
                .into()
            })
    }

    async fn refresh_models(&self) -> Result<RefreshResponse> {
        let total_models = self.with_state(|s| s.models.len() as u64);
        Ok(RefreshResponse {
            status: "success".to_string(),
            total_models,
            message: "refreshed".to_string(),
        })
    }

    async fn submit_generation(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<GenerateResponse> {
        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let reply = self.with_state(|s| {
            s.submit_calls.push(SubmitCall {
                model_id: model_id.to_string(),
                prompt: prompt.to_string(),
                parameters,
            });
            if s.submit_replies.is_empty() {
                Ok(GenerateResponse {
                    request_id: format!("req_{}", s.submit_calls.len()),
                    status: Some(GenerationStatus::Queued),
                    model_id: Some(model_id.to_string()),
                    created_at: None,
                    queue_position: None,
                })
            } else {
                s.submit_replies.remove(0)
            }
        });
        reply.map_err(|message| FallabError::Api { status: 500, message }.into())
    }

    async fn submit_generation_sync(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<StatusResponse> {
        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let reply = self.with_state(|s| {
            s.sync_calls.push(SubmitCall {
                model_id: model_id.to_string(),
                prompt: prompt.to_string(),
                parameters,
            });
            if s.sync_replies.is_empty() {
                Ok(completed_with_image(
                    &format!("sync_{}", s.sync_calls.len()),
                    "http://fake/sync.png",
                ))
            } else {
                s.sync_replies.remove(0)
            }
        });
        reply.map_err(|message| FallabError::Api { status: 500, message }.into())
    }

    async fn generation_status(&self, request_id: &str) -> Result<StatusResponse> {
        let step = self.with_state(|s| {
            s.status_calls.push((request_id.to_string(), Instant::now()));
            s.status_scripts.get_mut(request_id).and_then(|(steps, cursor)| {
                let step = steps.get(*cursor).or_else(|| steps.last()).cloned();
                *cursor += 1;
                step
            })
        });
        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match step {
            Some(StatusStep::Reply(reply)) => Ok(reply),
            Some(StatusStep::Fail(message)) => Err(FallabError::Api {
                status: 502,
                message,
            }
            .into()),
            None => Err(FallabError::Api {
                status: 404,
                message: format!("Request {} not found", request_id),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_fake_starts_empty() {
        let api = ScriptedApi::new();

        let categories = api.list_categories().await.unwrap();
        assert!(categories.categories.is_empty());
        assert_eq!(categories.total, 0);
        assert!(api.list_models(10, 0, None).await.unwrap().models.is_empty());
        assert!(api.readiness().await.unwrap());
        assert!(api.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_category_script_can_be_replaced_and_failed() {
        let api = ScriptedApi::new();

        api.set_categories(&["text-to-image", "text-to-video"]);
        assert_eq!(api.list_categories().await.unwrap().total, 2);

        api.fail_categories("redis down");
        let err = api.list_categories().await.unwrap_err();
        assert!(err.to_string().contains("redis down"));
        assert_eq!(api.category_calls(), 2);
    }

    #[tokio::test]
    async fn test_sync_submission_defaults_to_completed_image() {
        let api = ScriptedApi::new();

        let reply = api
            .submit_generation_sync("fal-ai/flux/dev", "a cat", None)
            .await
            .unwrap();

        assert_eq!(reply.request_id, "sync_1");
        assert_eq!(reply.status, GenerationStatus::Completed);
        assert_eq!(api.sync_calls().len(), 1);
        assert!(api.submit_calls().is_empty());
    }
}
