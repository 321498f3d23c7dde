//! Model catalog with category browsing and debounced search
//!
//! [`ModelCatalog`] keeps the list of models for the current [`View`].
//! Views are mutually exclusive: selecting a category clears the search
//! query and searching clears the category.
//!
//! Searches wait for a quiet period (300ms by default) before fetching.
//! Every load takes a sequence number; a load only applies its result if
//! no newer load started in the meantime, so a slow earlier response can
//! never overwrite a faster later one.
//!
//! Fetch failures never propagate: they are logged and the load yields an
//! empty model list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{ApiClient, Model, RefreshResponse};
use crate::config::CatalogConfig;
use crate::error::{FallabError, Result};

/// Minimum similarity of the final id segment for a "did you mean" suggestion
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// What the catalog is currently showing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum View {
    /// Every model
    #[default]
    All,
    /// Models in one category
    Category(String),
    /// Search results for a query
    Search(String),
}

/// Result of a load request
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The load was the latest one; these models are now current
    Applied(Vec<Model>),
    /// A newer load started first; nothing was applied
    Superseded,
}

#[derive(Default)]
struct CatalogState {
    categories: Option<Vec<String>>,
    view: View,
    models: Vec<Model>,
    seq: u64,
}

type CacheKey = Option<String>;

/// Cached model browser over the FalLab API
pub struct ModelCatalog {
    api: Arc<dyn ApiClient>,
    config: CatalogConfig,
    state: Mutex<CatalogState>,
    model_cache: RwLock<HashMap<CacheKey, (Vec<Model>, Instant)>>,
}

impl ModelCatalog {
    pub fn new(api: Arc<dyn ApiClient>, config: CatalogConfig) -> Self {
        Self {
            api,
            config,
            state: Mutex::new(CatalogState::default()),
            model_cache: RwLock::new(HashMap::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.config.debounce_ms)
    }

    fn is_cache_valid(&self, cached_at: Instant) -> bool {
        cached_at.elapsed() < Duration::from_secs(self.config.cache_ttl_seconds)
    }

    /// Loads the category list
    ///
    /// Cached until [`invalidate`](Self::invalidate). When the catalog is
    /// still on its initial `All` view, the first category becomes the
    /// active view.
    pub async fn load_categories(&self) -> Vec<String> {
        if let Some(categories) = self.state().categories.clone() {
            return categories;
        }

        let categories = match self.api.list_categories().await {
            Ok(list) => list.categories,
            Err(e) => {
                tracing::warn!("Failed to load model categories: {}", e);
                return Vec::new();
            }
        };

        let mut state = self.state();
        state.categories = Some(categories.clone());
        if state.view == View::All {
            if let Some(first) = categories.first() {
                state.view = View::Category(first.clone());
            }
        }
        tracing::debug!("Loaded {} categories", categories.len());
        categories
    }

    /// Switches the view and loads its models
    ///
    /// Search views wait for the debounce period first and are dropped if
    /// another load starts meanwhile. A blank search query falls back to
    /// the default category, or `All` when there is none.
    pub async fn load_models(&self, view: View) -> LoadOutcome {
        let view = self.normalize(view);
        let seq = {
            let mut state = self.state();
            state.seq += 1;
            state.view = view.clone();
            state.seq
        };

        if let View::Search(query) = &view {
            tokio::time::sleep(self.debounce()).await;
            if self.state().seq != seq {
                tracing::debug!("Search '{}' superseded during debounce", query);
                return LoadOutcome::Superseded;
            }
        }

        let models = self.fetch(&view).await;

        let mut state = self.state();
        if state.seq != seq {
            tracing::debug!("Discarding stale model list for {:?}", view);
            return LoadOutcome::Superseded;
        }
        state.models = models.clone();
        LoadOutcome::Applied(models)
    }

    /// Debounced search; shorthand for `load_models(View::Search(query))`
    pub async fn search(&self, query: &str) -> LoadOutcome {
        self.load_models(View::Search(query.to_string())).await
    }

    fn normalize(&self, view: View) -> View {
        match view {
            View::Search(query) if query.trim().is_empty() => self
                .state()
                .categories
                .as_ref()
                .and_then(|c| c.first().cloned())
                .map(View::Category)
                .unwrap_or(View::All),
            View::Search(query) => View::Search(query.trim().to_string()),
            other => other,
        }
    }

    async fn fetch(&self, view: &View) -> Vec<Model> {
        let result = match view {
            View::Search(query) => self
                .api
                .search_models(query, self.config.search_limit)
                .await
                .map(|r| r.models),
            View::Category(category) => self.cached_list(Some(category.clone())).await,
            View::All => self.cached_list(None).await,
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("Failed to load models for {:?}: {}", view, e);
            Vec::new()
        })
    }

    async fn cached_list(&self, category: CacheKey) -> Result<Vec<Model>> {
        if let Ok(cache) = self.model_cache.read() {
            if let Some((models, cached_at)) = cache.get(&category) {
                if self.is_cache_valid(*cached_at) {
                    tracing::debug!("Using cached model list for {:?}", category);
                    return Ok(models.clone());
                }
            }
        }

        let page = self
            .api
            .list_models(self.config.page_limit, 0, category.as_deref())
            .await?;

        if let Ok(mut cache) = self.model_cache.write() {
            cache.insert(category, (page.models.clone(), Instant::now()));
        }
        Ok(page.models)
    }

    /// Drops cached categories and model lists
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.model_cache.write() {
            cache.clear();
        }
        self.state().categories = None;
        tracing::debug!("Model catalog cache invalidated");
    }

    /// Asks the backend to refresh its catalog, then drops local caches
    ///
    /// # Errors
    ///
    /// Returns `FallabError::Catalog` if the backend refresh fails
    pub async fn refresh(&self) -> Result<RefreshResponse> {
        let response = self
            .api
            .refresh_models()
            .await
            .map_err(|e| FallabError::Catalog(format!("Failed to refresh models: {}", e)))?;
        self.invalidate();
        tracing::info!("Model catalog refreshed: {} models", response.total_models);
        Ok(response)
    }

    /// Finds a model by endpoint id
    ///
    /// Checks the current and cached lists first, then asks the backend.
    /// Lookup failures are logged and yield `None`.
    pub async fn find_model(&self, model_id: &str) -> Option<Model> {
        if let Some(model) = self.known_models().into_iter().find(|m| m.endpoint_id == model_id) {
            return Some(model);
        }

        match self.api.get_model(model_id).await {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::debug!("Model lookup for '{}' failed: {}", model_id, e);
                None
            }
        }
    }

    /// Closest known endpoint id to `model_id`, if any is close enough
    ///
    /// Ids share long provider prefixes such as `fal-ai/`, so candidates are
    /// ranked on the segment after the last `/` and ties go to the closer
    /// full id.
    pub async fn suggest(&self, model_id: &str) -> Option<String> {
        let mut candidates = self.known_models();
        if candidates.is_empty() {
            candidates = self.cached_list(None).await.unwrap_or_default();
        }

        let needle = model_id.to_lowercase();
        let needle_tail = last_segment(&needle);
        candidates
            .iter()
            .map(|m| {
                let id = m.endpoint_id.to_lowercase();
                let tail = strsim::normalized_damerau_levenshtein(needle_tail, last_segment(&id));
                let full = strsim::jaro_winkler(&needle, &id);
                (tail, full, &m.endpoint_id)
            })
            .filter(|(tail, _, _)| *tail >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
            .map(|(_, _, id)| id.clone())
    }

    /// Models from the current view and every cached list, deduplicated
    fn known_models(&self) -> Vec<Model> {
        let mut models = self.state().models.clone();
        if let Ok(cache) = self.model_cache.read() {
            for (cached, _) in cache.values() {
                for model in cached {
                    if !models.iter().any(|m| m.endpoint_id == model.endpoint_id) {
                        models.push(model.clone());
                    }
                }
            }
        }
        models
    }

    pub fn view(&self) -> View {
        self.state().view.clone()
    }

    /// Models of the most recently applied load
    pub fn models(&self) -> Vec<Model> {
        self.state().models.clone()
    }

    /// Cached categories, if loaded
    pub fn categories(&self) -> Option<Vec<String>> {
        self.state().categories.clone()
    }
}

fn last_segment(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}
