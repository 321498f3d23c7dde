//! Multi-session conversation store
//!
//! [`ConversationStore`] owns every session and message and drives the
//! generation lifecycle for assistant placeholders. Callers never receive
//! generation results directly; they observe them as in-place mutations of
//! the placeholder message, via snapshots or the [`ConversationStore::subscribe`]
//! revision channel.
//!
//! State lives behind a synchronous mutex that is never held across an
//! `.await`, so each store operation is atomic with respect to readers.
//!
//! # Settlement and epochs
//!
//! Every placeholder carries an `epoch`. A generation task captures it when
//! it starts and only applies its result if the message still has the same
//! epoch. Cancellation bumps the epoch, which turns any later result for
//! that task into a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{GenerationOutcome, GenerationStatus, StatusResponse};
use crate::config::{ConcurrencyPolicy, GenerationConfig};
use crate::conversation::types::{title_from, Message, Session};
use crate::error::{FallabError, Result};
use crate::generation::{GenerationClient, PollOptions, Submission};
use crate::metrics::GenerationMetrics;

/// Content written to a placeholder when its image is ready
pub const SUCCESS_CONTENT: &str = "Image generated successfully!";

/// Bookkeeping for one in-flight generation
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    /// Placeholder message being filled
    pub message_id: String,
    /// Remote request id, known once the submission is acknowledged
    pub request_id: Option<String>,
    pub model_id: String,
    pub submitted_at: DateTime<Utc>,
    /// Placeholder epoch captured at start
    pub epoch: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    sessions: Vec<Session>,
    active: Option<String>,
    /// Live handles keyed by session id
    handles: HashMap<String, GenerationHandle>,
}

impl State {
    /// NotFound or Busy if a generation may not start in `session_id`
    fn admit(&self, session_id: &str, policy: ConcurrencyPolicy) -> Result<()> {
        if self.session(session_id).is_none() {
            return Err(FallabError::NotFound(format!("session {}", session_id)).into());
        }
        let busy = match policy {
            ConcurrencyPolicy::PerSession => self.handles.contains_key(session_id),
            ConcurrencyPolicy::Global => !self.handles.is_empty(),
        };
        if busy {
            return Err(FallabError::Busy(format!(
                "a generation is already in progress for session {}",
                session_id
            ))
            .into());
        }
        Ok(())
    }

    fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    fn session_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    /// Drops the session's handle and bumps its placeholder epoch
    fn cancel_handle(&mut self, session_id: &str) -> bool {
        let Some(handle) = self.handles.remove(session_id) else {
            return false;
        };
        handle.cancel.cancel();
        if let Some(message) = self
            .session_mut(session_id)
            .and_then(|s| s.message_mut(&handle.message_id))
        {
            message.epoch += 1;
        }
        tracing::info!(
            "Cancelled generation for session {} (message {})",
            session_id,
            handle.message_id
        );
        true
    }

    /// True when the handle for `job` is still the live one
    fn owns_handle(&self, job: &Job) -> bool {
        self.handles
            .get(&job.session_id)
            .map_or(false, |h| h.message_id == job.message_id && h.epoch == job.epoch)
    }

    /// The placeholder for `job`, if it still exists at the same epoch
    fn current_placeholder(&mut self, job: &Job) -> Option<&mut Message> {
        self.session_mut(&job.session_id)
            .and_then(|s| s.message_mut(&job.message_id))
            .filter(|m| m.epoch == job.epoch)
    }
}

struct Inner {
    state: Mutex<State>,
    client: GenerationClient,
    poll: PollOptions,
    policy: ConcurrencyPolicy,
    revision: watch::Sender<u64>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn record_submission(&self, job: &Job, submission: &Submission) {
        {
            let mut state = self.state();
            if state.owns_handle(job) {
                if let Some(handle) = state.handles.get_mut(&job.session_id) {
                    handle.request_id = Some(submission.request_id.clone());
                }
            }
            let Some(message) = state.current_placeholder(job) else {
                tracing::debug!(
                    "Ignoring submission ack for superseded message {}",
                    job.message_id
                );
                return;
            };
            message.request_id = Some(submission.request_id.clone());
            message.status = Some(submission.status);
        }
        self.bump();
    }

    fn settle(&self, job: &Job, result: Result<StatusResponse>) {
        let outcome = {
            let mut state = self.state();
            if state.owns_handle(job) {
                state.handles.remove(&job.session_id);
            }

            let Some(message) = state.current_placeholder(job) else {
                tracing::debug!(
                    "Discarding stale result for message {} in session {}",
                    job.message_id,
                    job.session_id
                );
                return;
            };

            let (content, image_ref, status, label) = match result {
                Ok(payload) => match payload.outcome() {
                    Some(GenerationOutcome::Completed { image_url, .. }) => (
                        SUCCESS_CONTENT.to_string(),
                        image_url,
                        GenerationStatus::Completed,
                        "completed",
                    ),
                    Some(GenerationOutcome::Failed { error }) => (
                        format!("Error: {}", error),
                        None,
                        GenerationStatus::Failed,
                        "failed",
                    ),
                    None => (
                        format!("Error: unexpected status {}", payload.status),
                        None,
                        GenerationStatus::Failed,
                        "failed",
                    ),
                },
                Err(err) => {
                    let label = match FallabError::kind_of(&err) {
                        Some(FallabError::Timeout { .. }) => "timeout",
                        Some(FallabError::Cancelled(_)) => "cancelled",
                        _ => "failed",
                    };
                    (
                        format!("Error: {}", failure_message(&err)),
                        None,
                        GenerationStatus::Failed,
                        label,
                    )
                }
            };

            message.content = content;
            message.image_ref = image_ref;
            message.status = Some(status);
            message.timestamp = Utc::now();
            label
        };

        tracing::info!(
            "Generation settled: session={} message={} outcome={}",
            job.session_id,
            job.message_id,
            outcome
        );
        job.metrics.record_outcome(outcome);
        self.bump();
    }
}

/// Human-readable description of a generation failure
fn failure_message(err: &anyhow::Error) -> String {
    match FallabError::kind_of(err) {
        Some(FallabError::Generation(msg)) | Some(FallabError::Validation(msg)) => msg.clone(),
        _ => err.to_string(),
    }
}

struct Job {
    session_id: String,
    message_id: String,
    epoch: u64,
    model_id: String,
    prompt: String,
    cancel: CancellationToken,
    metrics: GenerationMetrics,
}

async fn run_generation(inner: Arc<Inner>, job: Job) {
    let result: Result<StatusResponse> = async {
        let submission = inner.client.submit(&job.model_id, &job.prompt, None).await?;
        inner.record_submission(&job, &submission);
        inner
            .client
            .poll_until_complete(&submission.request_id, inner.poll, &job.cancel)
            .await
    }
    .await;

    if job.cancel.is_cancelled() {
        job.metrics.record_outcome("cancelled");
    }
    inner.settle(&job, result);
}

/// In-memory store of chat sessions with background generations
///
/// Cloning yields another handle to the same store.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use fallab::api::HttpApiClient;
/// use fallab::config::GenerationConfig;
/// use fallab::conversation::ConversationStore;
/// use fallab::generation::GenerationClient;
///
/// # async fn example() -> fallab::error::Result<()> {
/// let api = Arc::new(HttpApiClient::with_base_url("http://localhost:8000/api/v1")?);
/// let store = ConversationStore::new(GenerationClient::new(api), &GenerationConfig::default());
///
/// let session = store.create_session();
/// store.append_user_message(&session, "a cat")?;
/// let placeholder = store.start_generation(&session, "flux-kontext", "a cat")?;
/// store.wait_until_settled(&session).await;
///
/// let message = store.message(&placeholder).expect("placeholder exists");
/// println!("{}", message.content);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<Inner>,
}

impl ConversationStore {
    /// Creates an empty store with no sessions
    pub fn new(client: GenerationClient, config: &GenerationConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                client,
                poll: PollOptions::from(config),
                policy: config.concurrency,
                revision,
            }),
        }
    }

    /// Prepends a new empty session and makes it active
    pub fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        {
            let mut state = self.inner.state();
            state.sessions.insert(0, Session::new(id.clone()));
            state.active = Some(id.clone());
        }
        tracing::debug!("Created session {}", id);
        self.inner.bump();
        id
    }

    /// Removes a session and all of its messages
    ///
    /// Any live generation in the session is cancelled first. If the
    /// session was active, the first remaining session becomes active.
    ///
    /// # Errors
    ///
    /// Returns `FallabError::NotFound` for an unknown session id
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        {
            let mut state = self.inner.state();
            let index = state
                .sessions
                .iter()
                .position(|s| s.id == session_id)
                .ok_or_else(|| FallabError::NotFound(format!("session {}", session_id)))?;

            state.cancel_handle(session_id);
            state.sessions.remove(index);

            if state.active.as_deref() == Some(session_id) {
                state.active = state.sessions.first().map(|s| s.id.clone());
            }
        }
        tracing::info!("Deleted session {}", session_id);
        self.inner.bump();
        Ok(())
    }

    /// Makes `session_id` the active session
    ///
    /// Generations running in other sessions keep running.
    pub fn select_session(&self, session_id: &str) -> Result<()> {
        {
            let mut state = self.inner.state();
            if state.session(session_id).is_none() {
                return Err(FallabError::NotFound(format!("session {}", session_id)).into());
            }
            state.active = Some(session_id.to_string());
        }
        self.inner.bump();
        Ok(())
    }

    /// Appends a user message and returns its id
    ///
    /// The first message of a session also sets the session title.
    pub fn append_user_message(&self, session_id: &str, content: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        {
            let mut state = self.inner.state();
            let session = state
                .session_mut(session_id)
                .ok_or_else(|| FallabError::NotFound(format!("session {}", session_id)))?;
            if session.messages.is_empty() {
                session.title = title_from(content);
            }
            session.messages.push(Message::user(id.clone(), content));
        }
        self.inner.bump();
        Ok(id)
    }

    /// Checks whether a generation could start in the session right now
    ///
    /// Applies the configured concurrency policy without changing anything.
    ///
    /// # Errors
    ///
    /// - `FallabError::NotFound` if the session does not exist
    /// - `FallabError::Busy` if a generation is already in flight (in this
    ///   session, or anywhere under the global policy)
    pub fn can_start(&self, session_id: &str) -> Result<()> {
        self.inner.state().admit(session_id, self.inner.policy)
    }

    /// Starts a background generation and returns the placeholder id
    ///
    /// The placeholder is appended before this returns; its later mutation
    /// is the only way the result is reported.
    ///
    /// # Errors
    ///
    /// - `FallabError::NotFound` if the session does not exist
    /// - `FallabError::Busy` if a generation is already in flight (in this
    ///   session, or anywhere under the global policy)
    /// - `FallabError::Generation` when called outside a tokio runtime; the
    ///   session is left untouched
    pub fn start_generation(
        &self,
        session_id: &str,
        model_id: &str,
        prompt: &str,
    ) -> Result<String> {
        self.launch(session_id, model_id, prompt, false)
    }

    /// Appends `prompt` as a user message and starts a generation for it
    ///
    /// Both messages are added under one lock, so a rejected prompt never
    /// leaves an unanswered user message behind. Returns the placeholder id.
    ///
    /// # Errors
    ///
    /// Same as [`start_generation`](Self::start_generation).
    pub fn send_prompt(&self, session_id: &str, model_id: &str, prompt: &str) -> Result<String> {
        self.launch(session_id, model_id, prompt, true)
    }

    fn launch(
        &self,
        session_id: &str,
        model_id: &str,
        prompt: &str,
        with_user_message: bool,
    ) -> Result<String> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            FallabError::Generation(format!("cannot start a generation without a runtime: {}", e))
        })?;

        let job = {
            let mut state = self.inner.state();
            state.admit(session_id, self.inner.policy)?;

            let message_id = Uuid::new_v4().to_string();
            let placeholder = Message::placeholder(message_id.clone(), model_id);
            let epoch = placeholder.epoch;
            if let Some(session) = state.session_mut(session_id) {
                if with_user_message {
                    if session.messages.is_empty() {
                        session.title = title_from(prompt);
                    }
                    session
                        .messages
                        .push(Message::user(Uuid::new_v4().to_string(), prompt));
                }
                session.messages.push(placeholder);
            }

            let cancel = CancellationToken::new();
            state.handles.insert(
                session_id.to_string(),
                GenerationHandle {
                    message_id: message_id.clone(),
                    request_id: None,
                    model_id: model_id.to_string(),
                    submitted_at: Utc::now(),
                    epoch,
                    cancel: cancel.clone(),
                },
            );

            Job {
                session_id: session_id.to_string(),
                message_id,
                epoch,
                model_id: model_id.to_string(),
                prompt: prompt.to_string(),
                cancel,
                metrics: GenerationMetrics::new(model_id),
            }
        };

        tracing::info!(
            "Starting generation: session={} model={} message={}",
            session_id,
            model_id,
            job.message_id
        );
        let message_id = job.message_id.clone();
        self.inner.bump();
        runtime.spawn(run_generation(self.inner.clone(), job));
        Ok(message_id)
    }

    /// Cancels the session's live generation, if any
    ///
    /// The remote job is not interrupted; its eventual result is discarded.
    /// Returns whether a generation was cancelled.
    pub fn cancel_generation(&self, session_id: &str) -> Result<bool> {
        let cancelled = {
            let mut state = self.inner.state();
            if state.session(session_id).is_none() {
                return Err(FallabError::NotFound(format!("session {}", session_id)).into());
            }
            state.cancel_handle(session_id)
        };
        if cancelled {
            self.inner.bump();
        }
        Ok(cancelled)
    }

    /// Cancels every live generation
    pub fn shutdown(&self) {
        let cancelled = {
            let mut state = self.inner.state();
            let sessions: Vec<String> = state.handles.keys().cloned().collect();
            sessions
                .iter()
                .filter(|id| state.cancel_handle(id))
                .count()
        };
        tracing::info!("Conversation store shut down; cancelled {} generation(s)", cancelled);
        if cancelled > 0 {
            self.inner.bump();
        }
    }

    /// Snapshot of all sessions, newest first
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.state().sessions.clone()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner.state().session(session_id).cloned()
    }

    /// Looks a message up across all sessions
    pub fn message(&self, message_id: &str) -> Option<Message> {
        self.inner
            .state()
            .sessions
            .iter()
            .find_map(|s| s.message(message_id).cloned())
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.inner.state().active.clone()
    }

    /// True while the session has a live generation
    pub fn has_pending(&self, session_id: &str) -> bool {
        self.inner.state().handles.contains_key(session_id)
    }

    /// Snapshot of the session's live generation handle
    pub fn handle(&self, session_id: &str) -> Option<GenerationHandle> {
        self.inner.state().handles.get(session_id).cloned()
    }

    /// Receiver of a revision counter bumped after every mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Waits until the session has no live generation
    pub async fn wait_until_settled(&self, session_id: &str) {
        let mut revisions = self.subscribe();
        loop {
            revisions.borrow_and_update();
            if !self.has_pending(session_id) {
                return;
            }
            if revisions.changed().await.is_err() {
                return;
            }
        }
    }
}
