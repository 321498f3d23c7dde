/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes these top-level command modules:

- `health`: Backend health check
- `models`: Model catalog browsing
- `generate`: One-shot generation
- `chat`: Interactive multi-session chat

Handlers stay thin; the catalog, generation client and conversation store
do the work.
*/

use crate::api::{ApiClient, HttpApiClient};
use crate::config::Config;
use crate::error::{FallabError, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

// Special commands parser for chat mode
pub mod special_commands;

// Model catalog commands
pub mod models;

/// Build the HTTP API client from configuration
pub(crate) fn api_client(config: &Config) -> Result<Arc<dyn ApiClient>> {
    Ok(Arc::new(HttpApiClient::new(&config.api)?))
}

/// Parse repeated `key=value` flags into a parameter map
///
/// Values that parse as JSON (numbers, booleans, arrays, objects) keep
/// their type; anything else is passed as a string. Returns `None` when no
/// parameters were given.
///
/// # Errors
///
/// Returns `FallabError::Validation` for an entry without `=` or with an
/// empty key
///
/// # Examples
///
/// ```
/// use fallab::commands::parse_params;
/// use serde_json::json;
///
/// let params = parse_params(&["num_images=2".to_string(), "style=anime".to_string()])
///     .unwrap()
///     .unwrap();
/// assert_eq!(params["num_images"], json!(2));
/// assert_eq!(params["style"], json!("anime"));
/// ```
pub fn parse_params(raw: &[String]) -> Result<Option<Map<String, Value>>> {
    if raw.is_empty() {
        return Ok(None);
    }

    let mut params = Map::new();
    for entry in raw {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            FallabError::Validation(format!("Invalid parameter '{}': expected KEY=VALUE", entry))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(
                FallabError::Validation(format!("Invalid parameter '{}': empty key", entry)).into(),
            );
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(Some(params))
}

// Health command handler
pub mod health {
    //! Backend health check.

    use super::*;
    use colored::Colorize;

    /// Query `/health` and print a summary
    pub async fn run_health(config: &Config, json: bool) -> Result<()> {
        let api = api_client(config)?;
        tracing::info!("Checking backend health at {}", config.api.base_url);
        let health = api.health().await?;

        if json {
            let out = serde_json::to_string_pretty(&health).map_err(FallabError::Serialization)?;
            println!("{}", out);
            return Ok(());
        }

        let status = if health.is_healthy() {
            health.status.green()
        } else {
            health.status.red()
        };
        println!("\nBackend:   {}", config.api.base_url);
        println!("Status:    {}", status);
        if let Some(version) = &health.version {
            println!("Version:   {}", version);
        }
        if let Some(redis) = &health.redis {
            let state = if redis.connected {
                "connected".green()
            } else {
                "disconnected".red()
            };
            match redis.latency_ms {
                Some(latency) => println!("Redis:     {} ({:.1}ms)", state, latency),
                None => println!("Redis:     {}", state),
            }
        }
        if let Some(services) = &health.services {
            for (name, state) in services {
                println!("  {}: {}", name, state);
            }
        }
        println!("Ready:     {}", check_label(api.readiness().await, "ready"));
        println!("Live:      {}", check_label(api.liveness().await, "live"));
        println!();
        Ok(())
    }

    fn check_label(result: Result<bool>, check: &str) -> colored::ColoredString {
        match result {
            Ok(true) => "yes".green(),
            Ok(false) => "no".red(),
            Err(e) => {
                tracing::warn!("{} check failed: {}", check, e);
                "unknown".yellow()
            }
        }
    }
}

// One-shot generation handler
pub mod generate {
    //! Submit one prompt and wait for its result.

    use super::*;
    use crate::api::{GenerationOutcome, StatusResponse};
    use crate::generation::{GenerationClient, PollOptions};
    use crate::metrics::GenerationMetrics;
    use colored::Colorize;
    use tokio_util::sync::CancellationToken;

    /// Submit a generation, wait for it and print the outcome
    ///
    /// With `sync` the blocking `/generate/sync` endpoint is used; otherwise
    /// the job is submitted and polled. Ctrl-C stops polling and leaves the
    /// remote job running.
    pub async fn run_generate(
        config: &Config,
        model: Option<String>,
        prompt: String,
        params: Vec<String>,
        json: bool,
        sync: bool,
    ) -> Result<()> {
        let model_id = model.unwrap_or_else(|| config.generation.default_model.clone());
        let parameters = parse_params(&params)?;
        let client = GenerationClient::new(api_client(config)?);
        let metrics = GenerationMetrics::new(model_id.as_str());

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let result = obtain_status(
            &client,
            &metrics,
            GenerationRequest {
                model_id: &model_id,
                prompt: &prompt,
                parameters,
                sync,
            },
            PollOptions::from(&config.generation),
            &cancel,
            !json,
        )
        .await;
        watcher.abort();
        let status = result?;

        if json {
            let out = serde_json::to_string_pretty(&status).map_err(FallabError::Serialization)?;
            println!("{}", out);
        }

        match status.outcome() {
            Some(GenerationOutcome::Completed { image_url, .. }) => {
                metrics.record_outcome("completed");
                if !json {
                    println!("{}", "Image generated successfully!".green());
                    if let Some(url) = image_url {
                        println!("{}", url);
                    }
                }
                Ok(())
            }
            Some(GenerationOutcome::Failed { error }) => {
                metrics.record_outcome("failed");
                Err(FallabError::Generation(error).into())
            }
            None => {
                metrics.record_outcome("failed");
                Err(FallabError::Generation(format!(
                    "unexpected non-terminal status {}",
                    status.status
                ))
                .into())
            }
        }
    }

    /// One generation to run from the command line
    pub(crate) struct GenerationRequest<'a> {
        pub model_id: &'a str,
        pub prompt: &'a str,
        pub parameters: Option<Map<String, Value>>,
        pub sync: bool,
    }

    /// Run `request` to a terminal status
    ///
    /// Any error, including a rejected submission, is recorded on `metrics`
    /// before it is returned.
    pub(crate) async fn obtain_status(
        client: &GenerationClient,
        metrics: &GenerationMetrics,
        request: GenerationRequest<'_>,
        opts: PollOptions,
        cancel: &CancellationToken,
        announce: bool,
    ) -> Result<StatusResponse> {
        let GenerationRequest {
            model_id,
            prompt,
            parameters,
            sync,
        } = request;

        let result = if sync {
            client.generate_sync(model_id, prompt, parameters).await
        } else {
            match client.submit(model_id, prompt, parameters).await {
                Ok(submission) => {
                    if announce {
                        println!(
                            "Submitted {} to {} ({})",
                            submission.request_id.cyan(),
                            model_id,
                            submission.status
                        );
                    }
                    client
                        .poll_until_complete(&submission.request_id, opts, cancel)
                        .await
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = &result {
            let outcome = match FallabError::kind_of(e) {
                Some(FallabError::Timeout { .. }) => "timeout",
                Some(FallabError::Cancelled(_)) => "cancelled",
                _ => "failed",
            };
            metrics.record_outcome(outcome);
        }
        result
    }

}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Runs a readline loop over a `ConversationStore`. Each prompt starts a
    //! generation in the active session and the loop waits for the
    //! placeholder to settle. Ctrl-C while waiting detaches: the generation
    //! keeps running in its session.

    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::conversation::{ConversationStore, Message, Role};
    use crate::generation::GenerationClient;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    pub async fn run_chat(config: Config, model: Option<String>) -> Result<()> {
        let api = api_client(&config)?;
        let catalog = ModelCatalog::new(api.clone(), config.catalog.clone());
        let store = ConversationStore::new(GenerationClient::new(api), &config.generation);
        let mut model_id = model.unwrap_or_else(|| config.generation.default_model.clone());

        let mut rl = DefaultEditor::new()?;
        store.create_session();
        print_welcome_banner(&model_id);

        loop {
            let prompt = format!("[{}] >> ", model_id).cyan().to_string();
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::NewSession => {
                            store.create_session();
                            println!("Started a new session\n");
                        }
                        SpecialCommand::ListSessions => print_sessions(&store),
                        SpecialCommand::SwitchSession(n) => match session_at(&store, n) {
                            Some(id) => {
                                store.select_session(&id)?;
                                println!("Switched to session {}\n", n);
                            }
                            None => eprintln!("{}\n", format!("No session {}", n).red()),
                        },
                        SpecialCommand::DeleteSession(n) => {
                            let target = match n {
                                Some(n) => session_at(&store, n),
                                None => store.active_session_id(),
                            };
                            match target {
                                Some(id) => {
                                    store.delete_session(&id)?;
                                    if store.sessions().is_empty() {
                                        store.create_session();
                                    }
                                    println!("Session deleted\n");
                                }
                                None => eprintln!("{}\n", "No such session".red()),
                            }
                        }
                        SpecialCommand::Cancel => {
                            let cancelled = match store.active_session_id() {
                                Some(id) => store.cancel_generation(&id)?,
                                None => false,
                            };
                            if cancelled {
                                println!("{}\n", "Generation cancelled".yellow());
                            } else {
                                println!("Nothing to cancel\n");
                            }
                        }
                        SpecialCommand::SwitchModel(requested) => {
                            model_id = resolve_model(&catalog, &requested)
                                .await
                                .unwrap_or(model_id);
                        }
                        SpecialCommand::History => print_history(&store),
                        SpecialCommand::Help => print_help(),
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {
                            submit_prompt(&store, &model_id, trimmed).await?;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        store.shutdown();
        println!("Goodbye!");
        Ok(())
    }

    async fn submit_prompt(store: &ConversationStore, model_id: &str, prompt: &str) -> Result<()> {
        let session_id = match store.active_session_id() {
            Some(id) => id,
            None => store.create_session(),
        };

        let placeholder = match store.send_prompt(&session_id, model_id, prompt) {
            Ok(id) => id,
            Err(e) => {
                if let Some(FallabError::Busy(_)) = FallabError::kind_of(&e) {
                    eprintln!(
                        "{}\n",
                        "A generation is already running (use /cancel)".yellow()
                    );
                } else {
                    eprintln!("{}\n", e.to_string().yellow());
                }
                return Ok(());
            }
        };

        println!("{}", "Generating...".dimmed());
        tokio::select! {
            _ = store.wait_until_settled(&session_id) => {
                if let Some(message) = store.message(&placeholder) {
                    print_message(&message);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!(
                    "{}\n",
                    "Still generating in the background; see /sessions and /history".yellow()
                );
            }
        }
        Ok(())
    }

    /// Picks the model to switch to, or `None` to keep the current one
    async fn resolve_model(catalog: &ModelCatalog, requested: &str) -> Option<String> {
        if let Some(model) = catalog.find_model(requested).await {
            println!("Switched to model {}\n", model.endpoint_id.green());
            return Some(model.endpoint_id);
        }

        if let Some(suggestion) = catalog.suggest(requested).await {
            println!(
                "Unknown model '{}'. Did you mean '{}'?\n",
                requested,
                suggestion.green()
            );
            return None;
        }

        println!(
            "{}\n",
            format!("Model '{}' not found in the catalog; using it anyway", requested).yellow()
        );
        Some(requested.to_string())
    }

    /// Id of the session at 1-based position `n` in the session list
    pub(crate) fn session_at(store: &ConversationStore, n: usize) -> Option<String> {
        n.checked_sub(1)
            .and_then(|i| store.sessions().get(i).map(|s| s.id.clone()))
    }

    fn print_sessions(store: &ConversationStore) {
        let active = store.active_session_id();
        println!();
        for (i, session) in store.sessions().iter().enumerate() {
            let marker = if active.as_deref() == Some(session.id.as_str()) {
                "*"
            } else {
                " "
            };
            let pending = if store.has_pending(&session.id) {
                " (generating)".yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "{} {}. {} [{} messages]{}",
                marker,
                i + 1,
                session.title,
                session.messages.len(),
                pending
            );
        }
        println!();
    }

    fn print_history(store: &ConversationStore) {
        let Some(session) = store.active_session_id().and_then(|id| store.session(&id)) else {
            println!("No active session\n");
            return;
        };
        if session.messages.is_empty() {
            println!("No messages yet\n");
            return;
        }
        println!("\n{}\n", session.title.bold());
        for message in &session.messages {
            print_message(message);
        }
    }

    fn print_message(message: &Message) {
        match message.role {
            Role::User => println!("{} {}", "you:".bold(), message.content),
            Role::Assistant => {
                let status = message
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let content = if message.content.is_empty() {
                    format!("({})", status).dimmed().to_string()
                } else if message.content.starts_with("Error:") {
                    message.content.red().to_string()
                } else {
                    message.content.green().to_string()
                };
                println!("{} {}", "fallab:".bold(), content);
                if let Some(url) = &message.image_ref {
                    println!("        {}", url.underline());
                }
            }
        }
        println!();
    }

    fn print_welcome_banner(model_id: &str) {
        println!("\n{}", "FalLab interactive chat".bold());
        println!("Model: {}", model_id.green());
        println!("Type a prompt to generate, '/help' for commands, '/exit' to quit.\n");
    }

}
