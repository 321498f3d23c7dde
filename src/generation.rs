//! Generation submission and status polling
//!
//! [`GenerationClient`] submits one job to `/generate` and then observes it
//! through `/status/{request_id}` until it reaches a terminal status, the
//! wait budget runs out, or the caller cancels.
//!
//! Polling never retries a failed status query and never re-submits. A
//! timeout only stops observation; the remote job may still finish.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, GenerationStatus, StatusResponse};
use crate::config::GenerationConfig;
use crate::error::{FallabError, Result};

/// Acknowledgement of a submitted generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Remote request id used for status queries
    pub request_id: String,
    /// Status reported at submit time, `Submitted` when the service omits it
    pub status: GenerationStatus,
}

/// Polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Give up after this long without a terminal status
    pub max_wait: Duration,
    /// Wait between consecutive status queries
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(600_000),
            interval: Duration::from_millis(2_000),
        }
    }
}

impl From<&GenerationConfig> for PollOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_wait: Duration::from_millis(config.max_wait_ms),
            interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Submits generation jobs and polls them to completion
///
/// Cheap to clone; clones share the underlying API client.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use fallab::api::HttpApiClient;
/// use fallab::generation::{GenerationClient, PollOptions};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> fallab::error::Result<()> {
/// let api = Arc::new(HttpApiClient::with_base_url("http://localhost:8000/api/v1")?);
/// let client = GenerationClient::new(api);
///
/// let submission = client.submit("flux-kontext", "a cat", None).await?;
/// let status = client
///     .poll_until_complete(&submission.request_id, PollOptions::default(), &CancellationToken::new())
///     .await?;
/// println!("{}", status.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GenerationClient {
    api: Arc<dyn ApiClient>,
}

impl GenerationClient {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self { api }
    }

    /// Submits a single generation request
    ///
    /// # Errors
    ///
    /// Returns `FallabError::Validation` if `model_id` or `prompt` is blank,
    /// and `FallabError::Generation` if the remote submission fails.
    pub async fn submit(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<Submission> {
        validate_request(model_id, prompt)?;

        tracing::info!("Submitting generation: model_id={}", model_id);
        let response = self
            .api
            .submit_generation(model_id, prompt, parameters)
            .await
            .map_err(|e| {
                tracing::error!("Generation submit failed for {}: {}", model_id, e);
                FallabError::Generation(format!("Failed to submit generation: {}", e))
            })?;

        let submission = Submission {
            request_id: response.request_id,
            status: response.status.unwrap_or_default(),
        };
        tracing::info!(
            "Generation submitted: request_id={} status={}",
            submission.request_id,
            submission.status
        );
        Ok(submission)
    }

    /// Runs one generation through the blocking `/generate/sync` endpoint
    ///
    /// The backend holds the connection until the job is terminal, so there
    /// is no polling budget here beyond the HTTP client's own timeout.
    ///
    /// # Errors
    ///
    /// Returns `FallabError::Validation` if `model_id` or `prompt` is blank,
    /// and `FallabError::Generation` if the request fails.
    pub async fn generate_sync(
        &self,
        model_id: &str,
        prompt: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<StatusResponse> {
        validate_request(model_id, prompt)?;

        tracing::info!("Running synchronous generation: model_id={}", model_id);
        let status = self
            .api
            .submit_generation_sync(model_id, prompt, parameters)
            .await
            .map_err(|e| {
                tracing::error!("Synchronous generation failed for {}: {}", model_id, e);
                FallabError::Generation(format!("Failed to run generation: {}", e))
            })?;

        tracing::info!(
            "Synchronous generation finished: request_id={} status={}",
            status.request_id,
            status.status
        );
        Ok(status)
    }

    /// Polls `request_id` until it completes or fails
    ///
    /// Queries immediately, then waits `opts.interval` between queries.
    /// Returns the first `completed` or `failed` payload; never returns a
    /// non-terminal status.
    ///
    /// # Errors
    ///
    /// - `FallabError::Generation` as soon as a status query fails (no retry)
    /// - `FallabError::Timeout` once `opts.max_wait` has elapsed
    /// - `FallabError::Cancelled` when `cancel` fires; no query is issued
    ///   after that
    pub async fn poll_until_complete(
        &self,
        request_id: &str,
        opts: PollOptions,
        cancel: &CancellationToken,
    ) -> Result<StatusResponse> {
        let started = Instant::now();
        let deadline = started + opts.max_wait;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Polling cancelled: request_id={}", request_id);
                return Err(FallabError::Cancelled(request_id.to_string()).into());
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "Generation {} not finished after {}ms; giving up",
                    request_id,
                    opts.max_wait.as_millis()
                );
                return Err(FallabError::Timeout {
                    request_id: request_id.to_string(),
                    waited_ms: now.duration_since(started).as_millis() as u64,
                }
                .into());
            }

            attempt += 1;
            let status = self.api.generation_status(request_id).await.map_err(|e| {
                tracing::error!("Status query for {} failed: {}", request_id, e);
                FallabError::Generation(format!("Failed to get generation status: {}", e))
            })?;

            tracing::debug!(
                "Poll attempt {}: request_id={} status={}",
                attempt,
                request_id,
                status.status
            );

            if status.status.is_terminal() {
                return Ok(status);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(opts.interval.min(remaining)) => {}
            }
        }
    }
}

fn validate_request(model_id: &str, prompt: &str) -> Result<()> {
    if model_id.trim().is_empty() {
        return Err(FallabError::Validation("model id cannot be empty".to_string()).into());
    }
    if prompt.trim().is_empty() {
        return Err(FallabError::Validation("prompt cannot be empty".to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{completed_with_image, status_reply, ScriptedApi, StatusStep};
    use crate::api::GenerationOutcome;

    fn client_with(api: &Arc<ScriptedApi>) -> GenerationClient {
        GenerationClient::new(api.clone())
    }

    fn opts(max_wait_ms: u64, interval_ms: u64) -> PollOptions {
        PollOptions {
            max_wait: Duration::from_millis(max_wait_ms),
            interval: Duration::from_millis(interval_ms),
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_model_id() {
        let api = Arc::new(ScriptedApi::new());
        let err = client_with(&api).submit("", "a cat", None).await.unwrap_err();
        assert!(matches!(
            FallabError::kind_of(&err),
            Some(FallabError::Validation(_))
        ));
        assert!(api.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_prompt() {
        let api = Arc::new(ScriptedApi::new());
        let err = client_with(&api)
            .submit("flux-kontext", "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(
            FallabError::kind_of(&err),
            Some(FallabError::Validation(_))
        ));
        assert!(api.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_returns_request_id_and_status() {
        let api = Arc::new(ScriptedApi::new());
        api.push_submit_reply("r1", Some(GenerationStatus::Queued));

        let submission = client_with(&api)
            .submit("flux-kontext", "cat", None)
            .await
            .unwrap();

        assert_eq!(submission.request_id, "r1");
        assert_eq!(submission.status, GenerationStatus::Queued);
        let calls = api.submit_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model_id, "flux-kontext");
        assert_eq!(calls[0].prompt, "cat");
    }

    #[tokio::test]
    async fn test_submit_defaults_missing_status_to_submitted() {
        let api = Arc::new(ScriptedApi::new());
        api.push_submit_reply("r1", None);

        let submission = client_with(&api)
            .submit("flux-kontext", "cat", None)
            .await
            .unwrap();
        assert_eq!(submission.status, GenerationStatus::Submitted);
    }

    #[tokio::test]
    async fn test_submit_failure_is_generation_error() {
        let api = Arc::new(ScriptedApi::new());
        api.push_submit_failure("model unavailable");

        let err = client_with(&api)
            .submit("flux-kontext", "cat", None)
            .await
            .unwrap_err();
        match FallabError::kind_of(&err) {
            Some(FallabError::Generation(msg)) => assert!(msg.contains("model unavailable")),
            other => panic!("expected generation error, got {:?}", other),
        }
        assert_eq!(api.submit_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_forwards_parameters() {
        let api = Arc::new(ScriptedApi::new());
        let mut params = Map::new();
        params.insert("num_images".to_string(), Value::from(2));

        client_with(&api)
            .submit("flux-kontext", "cat", Some(params.clone()))
            .await
            .unwrap();
        assert_eq!(api.submit_calls()[0].parameters, Some(params));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_waits_between_each_nonterminal_status() {
        let api = Arc::new(ScriptedApi::new());
        api.script_steps(
            "r1",
            vec![
                StatusStep::Reply(status_reply("r1", GenerationStatus::Queued, None, None)),
                StatusStep::Reply(status_reply("r1", GenerationStatus::Processing, None, None)),
                StatusStep::Reply(completed_with_image("r1", "http://x/img.png")),
            ],
        );

        let start = Instant::now();
        let status = client_with(&api)
            .poll_until_complete("r1", opts(600_000, 2_000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status.status, GenerationStatus::Completed);
        assert_eq!(
            status.outcome(),
            Some(GenerationOutcome::Completed {
                image_url: Some("http://x/img.png".to_string()),
                result: serde_json::json!({"images": [{"url": "http://x/img.png"}]}),
            })
        );
        assert_eq!(api.status_call_count("r1"), 3);
        // Two inter-query waits, nothing else
        assert_eq!(start.elapsed(), Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_failed_payload_as_terminal() {
        let api = Arc::new(ScriptedApi::new());
        api.script_steps(
            "r1",
            vec![StatusStep::Reply(status_reply(
                "r1",
                GenerationStatus::Failed,
                None,
                Some("NSFW content detected"),
            ))],
        );

        let status = client_with(&api)
            .poll_until_complete("r1", opts(1_000, 100), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            status.outcome(),
            Some(GenerationOutcome::Failed {
                error: "NSFW content detected".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_without_querying_past_deadline() {
        let api = Arc::new(ScriptedApi::new());
        api.script_status("r1", &[GenerationStatus::Queued]);

        let start = Instant::now();
        let err = client_with(&api)
            .poll_until_complete("r1", opts(1_000, 300), &CancellationToken::new())
            .await
            .unwrap_err();

        match FallabError::kind_of(&err) {
            Some(FallabError::Timeout { request_id, .. }) => assert_eq!(request_id, "r1"),
            other => panic!("expected timeout, got {:?}", other),
        }
        let deadline = start + Duration::from_millis(1_000);
        let times = api.status_call_times("r1");
        assert_eq!(times.len(), 4);
        assert!(times.iter().all(|t| *t < deadline));
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_shorter_than_interval() {
        let api = Arc::new(ScriptedApi::new());
        api.script_status("r1", &[GenerationStatus::Processing]);

        let start = Instant::now();
        let err = client_with(&api)
            .poll_until_complete("r1", opts(1_000, 2_000), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            FallabError::kind_of(&err),
            Some(FallabError::Timeout { .. })
        ));
        assert_eq!(api.status_call_count("r1"), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fails_immediately_on_query_error() {
        let api = Arc::new(ScriptedApi::new());
        api.script_steps(
            "r1",
            vec![
                StatusStep::Reply(status_reply("r1", GenerationStatus::Queued, None, None)),
                StatusStep::Fail("bad gateway".to_string()),
                StatusStep::Reply(completed_with_image("r1", "http://x/img.png")),
            ],
        );

        let err = client_with(&api)
            .poll_until_complete("r1", opts(600_000, 2_000), &CancellationToken::new())
            .await
            .unwrap_err();

        match FallabError::kind_of(&err) {
            Some(FallabError::Generation(msg)) => assert!(msg.contains("bad gateway")),
            other => panic!("expected generation error, got {:?}", other),
        }
        assert_eq!(api.status_call_count("r1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_querying_after_cancel() {
        let api = Arc::new(ScriptedApi::new());
        api.script_status("r1", &[GenerationStatus::Queued]);
        let cancel = CancellationToken::new();

        let poller = {
            let client = client_with(&api);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .poll_until_complete("r1", opts(600_000, 2_000), &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        cancel.cancel();
        let err = poller.await.unwrap().unwrap_err();

        assert!(matches!(
            FallabError::kind_of(&err),
            Some(FallabError::Cancelled(_))
        ));
        let queried = api.status_call_count("r1");
        assert_eq!(queried, 2);

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(api.status_call_count("r1"), queried);
    }

    #[tokio::test]
    async fn test_poll_with_cancelled_token_never_queries() {
        let api = Arc::new(ScriptedApi::new());
        api.script_status("r1", &[GenerationStatus::Completed]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client_with(&api)
            .poll_until_complete("r1", opts(1_000, 100), &cancel)
            .await;
        assert!(result.is_err());
        assert_eq!(api.status_call_count("r1"), 0);
    }

    #[tokio::test]
    async fn test_generate_sync_returns_terminal_result_without_polling() {
        let api = Arc::new(ScriptedApi::new());
        api.push_sync_reply(completed_with_image("r9", "http://x/sync.png"));

        let status = client_with(&api)
            .generate_sync("flux-kontext", "a cat", None)
            .await
            .unwrap();

        assert_eq!(
            status.outcome(),
            Some(GenerationOutcome::Completed {
                image_url: Some("http://x/sync.png".to_string()),
                result: serde_json::json!({"images": [{"url": "http://x/sync.png"}]}),
            })
        );
        assert_eq!(api.sync_calls().len(), 1);
        assert!(api.submit_calls().is_empty());
        assert_eq!(api.status_call_count("r9"), 0);
    }

    #[tokio::test]
    async fn test_generate_sync_validates_and_wraps_failures() {
        let api = Arc::new(ScriptedApi::new());
        let client = client_with(&api);

        let err = client.generate_sync("flux-kontext", "", None).await.unwrap_err();
        assert!(matches!(
            FallabError::kind_of(&err),
            Some(FallabError::Validation(_))
        ));
        assert!(api.sync_calls().is_empty());

        api.push_sync_failure("model crashed");
        let err = client
            .generate_sync("flux-kontext", "a cat", None)
            .await
            .unwrap_err();
        match FallabError::kind_of(&err) {
            Some(FallabError::Generation(msg)) => assert!(msg.contains("model crashed")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_poll_options_from_config() {
        let config = GenerationConfig {
            max_wait_ms: 1_000,
            poll_interval_ms: 250,
            ..GenerationConfig::default()
        };
        let opts = PollOptions::from(&config);
        assert_eq!(opts.max_wait, Duration::from_millis(1_000));
        assert_eq!(opts.interval, Duration::from_millis(250));
        assert_eq!(PollOptions::default().interval, Duration::from_millis(2_000));
    }
}
