//! Search pipeline: corpus match (structural + full-text) → precise filter →
//! scoring → ordering → page.
//!
//! Only the corpus and ledger reads suspend; everything after them is
//! synchronous computation over the fetched snapshot. A search whose matches
//! exceed the candidate limit is rejected rather than ranked from a slice.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{HistoryEvent, Recipe};
use crate::services::filter_compiler::{CompiledFilter, SearchRequest};
use crate::services::ledger::InteractionLedger;
use crate::services::popularity::PopularityBoard;
use crate::services::scoring::{text_signal, ScoredRecipe, ScoringEngine};
use crate::services::sequencer::{self, Page};

/// A matching recipe with its raw full-text rank (0 without query text).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub recipe: Recipe,
    pub text_rank: f64,
}

/// Up to `limit` candidates plus the number of recipes that matched in total.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub matched: u64,
}

impl CandidateSet {
    pub fn is_truncated(&self) -> bool {
        self.matched > self.candidates.len() as u64
    }
}

/// Read access to published recipes.
#[async_trait]
pub trait RecipeCorpus: Send + Sync {
    /// Published recipes passing the structural predicates and, when the
    /// filter carries query text, the full-text match. At most `limit` are
    /// returned; `matched` counts every match regardless of `limit`.
    async fn candidates(&self, filter: &CompiledFilter, limit: usize) -> Result<CandidateSet>;

    /// A published recipe by id.
    async fn find_published(&self, id: Uuid) -> Result<Option<Recipe>>;

    /// Published recipes among `ids`, in no particular order.
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Recipe>>;
}

pub struct SearchService {
    corpus: Arc<dyn RecipeCorpus>,
    ledger: Arc<dyn InteractionLedger>,
    popularity: PopularityBoard,
    engine: ScoringEngine,
    candidate_limit: usize,
}

impl SearchService {
    pub fn new(
        corpus: Arc<dyn RecipeCorpus>,
        ledger: Arc<dyn InteractionLedger>,
        popularity: PopularityBoard,
        engine: ScoringEngine,
        candidate_limit: usize,
    ) -> Self {
        Self {
            corpus,
            ledger,
            popularity,
            engine,
            candidate_limit,
        }
    }

    /// Ranked page for `user_id`. Fails with a retryable 503 when the corpus
    /// or ledger cannot be read; never returns a silently partial page.
    pub async fn search(
        &self,
        user_id: Uuid,
        request: &SearchRequest,
        now: DateTime<Utc>,
    ) -> Result<Page<ScoredRecipe>> {
        let started = Instant::now();
        let result = self.run(user_id, request, now).await;
        metrics::SEARCH_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AppError::DependencyUnavailable { .. }) => "unavailable",
            Err(AppError::SearchTooBroad { .. }) => "too_broad",
            Err(_) => "error",
        };
        metrics::SEARCH_REQUESTS_TOTAL
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn run(
        &self,
        user_id: Uuid,
        request: &SearchRequest,
        now: DateTime<Utc>,
    ) -> Result<Page<ScoredRecipe>> {
        let filter = &request.filter;

        let fetched = self
            .corpus
            .candidates(filter, self.candidate_limit)
            .await
            .map_err(|e| e.unavailable("recipe corpus"))?;
        if fetched.is_truncated() {
            warn!(
                matched = fetched.matched,
                candidate_limit = self.candidate_limit,
                "Search matched more recipes than can be ranked"
            );
            return Err(AppError::SearchTooBroad {
                matched: fetched.matched,
                limit: self.candidate_limit,
            });
        }

        let candidates: Vec<Candidate> = fetched
            .candidates
            .into_iter()
            .filter(|c| c.recipe.is_published() && filter.matches(&c.recipe))
            .collect();
        let best_rank = candidates
            .iter()
            .map(|c| c.text_rank)
            .fold(0.0_f64, f64::max);

        metrics::SEARCH_CANDIDATES.observe(candidates.len() as f64);

        let touches = if candidates.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<Uuid> = candidates.iter().map(|c| c.recipe.id).collect();
            let since = now - Duration::days(self.engine.params().repeat_lookback_days);
            group_by_recipe(
                self.ledger
                    .touches(user_id, &ids, since)
                    .await
                    .map_err(|e| e.unavailable("interaction ledger"))?,
            )
        };

        let popularity = self.popularity.current().await;
        if popularity.computed_at.is_none() {
            debug!("Popularity snapshot not loaded yet, all popularity signals are zero");
        }

        let mut scored: Vec<ScoredRecipe> = candidates
            .into_iter()
            .map(|Candidate { recipe, text_rank }| {
                let signals = self.engine.score(
                    &recipe,
                    filter,
                    text_signal(text_rank, best_rank),
                    popularity.count(&recipe.id),
                    popularity.max(),
                    touches.get(&recipe.id).into_iter().flatten(),
                    now,
                );
                ScoredRecipe { recipe, signals }
            })
            .collect();

        sequencer::order(&mut scored, request.sort);

        debug!(
            user_id = %user_id,
            candidate_count = scored.len(),
            sort = ?request.sort,
            "Search scored"
        );

        Ok(sequencer::paginate(scored, request.page))
    }
}

fn group_by_recipe(events: Vec<HistoryEvent>) -> HashMap<Uuid, Vec<HistoryEvent>> {
    let mut grouped: HashMap<Uuid, Vec<HistoryEvent>> = HashMap::new();
    for event in events {
        grouped.entry(event.recipe_id).or_default().push(event);
    }
    grouped
}
