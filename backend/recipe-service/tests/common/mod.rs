//! In-memory stand-ins for the storage contracts, plus an app harness that
//! wires them into the real route table.

#![allow(dead_code)]

use actix_middleware::{InMemoryBucketStore, RateLimitConfig, RateLimiter};
use actix_web::web;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use idempotency_gate::{IdempotencyGate, InMemoryIdempotencyStore};
use recipe_service::models::{
    EventKind, HistoryEvent, Membership, Nutrition, Recipe, RecipeContent, RecipeStatus,
    SavedRecipe, UserRecipe,
};
use recipe_service::services::ledger::{
    decide_event, view_dedup_window, CasOutcome, EventDecision, RecordedEvent, SaveTransition,
};
use recipe_service::services::{
    Candidate, CandidateSet, CompiledFilter, CurationService, InteractionLedger, PopularityBoard,
    RecipeCorpus, ScoringEngine, ScoringParams, SearchService, Taxonomy, UserRecipeRepository,
};
use recipe_service::{configure_extractors, configure_routes, AppError, AppState, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLES_HEADER: &str = "X-User-Roles";

/// Candidate limit used unless a test asks for a smaller one.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 10_000;

/// What a storage call returns while a double is switched off.
fn unreachable_store() -> AppError {
    AppError::Database(sqlx::Error::PoolTimedOut)
}

/// Lowercase alphanumeric words.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Share of query words found in the recipe's title, description and
/// ingredients; `None` when none of them is.
fn word_rank(query: &[String], content: &RecipeContent) -> Option<f64> {
    let mut document = words(&content.title);
    document.extend(words(&content.description));
    for ingredient in &content.ingredients {
        document.extend(words(ingredient));
    }
    let hits = query.iter().filter(|w| document.contains(w)).count();
    (hits > 0).then(|| hits as f64 / query.len() as f64)
}

pub fn content(title: &str) -> RecipeContent {
    RecipeContent {
        title: title.to_string(),
        description: String::new(),
        ingredients: vec!["water".to_string()],
        prep_minutes: 5,
        cook_minutes: 10,
        nutrition: Nutrition {
            calories: 400.0,
            protein_g: 20.0,
            sugar_g: 5.0,
            sodium_mg: 300.0,
            fiber_g: 4.0,
            saturated_fat_g: Some(2.0),
        },
        cuisines: vec![],
        diet_tags: vec![],
        flag_tags: vec![],
        allergens: vec![],
    }
}

/// A published recipe last updated `age` ago.
pub fn published(content: RecipeContent, age: Duration) -> Recipe {
    let at = Utc::now() - age;
    Recipe::new(content, RecipeStatus::Published, at)
}

#[derive(Default)]
pub struct MemoryCorpus {
    recipes: Mutex<Vec<Recipe>>,
    unavailable: AtomicBool,
}

impl MemoryCorpus {
    /// Make every read fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unreachable_store());
        }
        Ok(())
    }

    pub fn upsert(&self, recipe: Recipe) {
        let mut recipes = self.recipes.lock().unwrap();
        recipes.retain(|r| r.id != recipe.id);
        recipes.push(recipe);
    }

    pub fn get(&self, id: Uuid) -> Option<Recipe> {
        self.recipes
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait]
impl RecipeCorpus for MemoryCorpus {
    async fn candidates(&self, filter: &CompiledFilter, limit: usize) -> Result<CandidateSet> {
        self.check_available()?;
        let query = filter
            .text
            .as_deref()
            .map(words)
            .filter(|q| !q.is_empty());

        let mut found: Vec<Candidate> = self
            .recipes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_published() && filter.matches(r))
            .filter_map(|r| {
                let text_rank = match &query {
                    Some(q) => word_rank(q, &r.content)?,
                    None => 0.0,
                };
                Some(Candidate {
                    recipe: r.clone(),
                    text_rank,
                })
            })
            .collect();
        found.sort_by(|a, b| {
            b.text_rank
                .partial_cmp(&a.text_rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.recipe.updated_at.cmp(&a.recipe.updated_at))
                .then(a.recipe.id.cmp(&b.recipe.id))
        });
        let matched = found.len() as u64;
        found.truncate(limit);
        Ok(CandidateSet {
            candidates: found,
            matched,
        })
    }

    async fn find_published(&self, id: Uuid) -> Result<Option<Recipe>> {
        self.check_available()?;
        Ok(self.get(id).filter(|r| r.is_published()))
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Recipe>> {
        self.check_available()?;
        Ok(self
            .recipes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_published() && ids.contains(&r.id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct LedgerState {
    saved: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    events: Vec<HistoryEvent>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    unavailable: AtomicBool,
}

impl MemoryLedger {
    /// Make every call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unreachable_store());
        }
        Ok(())
    }

    pub fn events_for(&self, user_id: Uuid, recipe_id: Uuid) -> Vec<HistoryEvent> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.user_id == user_id && e.recipe_id == recipe_id)
            .cloned()
            .collect()
    }

    pub fn push_event(&self, event: HistoryEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl InteractionLedger for MemoryLedger {
    async fn membership(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Membership> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(Membership::from_saved(
            state.saved.contains_key(&(user_id, recipe_id)),
        ))
    }

    async fn compare_and_set_membership(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        transition: SaveTransition,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let key = (user_id, recipe_id);
        let current = Membership::from_saved(state.saved.contains_key(&key));
        if current != transition.from {
            return Ok(CasOutcome::Conflict(current));
        }
        if transition.to.is_saved() {
            state.saved.insert(key, now);
        } else {
            state.saved.remove(&key);
        }
        Ok(CasOutcome::Applied)
    }

    async fn saved(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SavedRecipe>, usize)> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let mut saved: Vec<SavedRecipe> = state
            .saved
            .iter()
            .filter(|((user, _), _)| *user == user_id)
            .map(|((user, recipe), at)| SavedRecipe {
                user_id: *user,
                recipe_id: *recipe,
                saved_at: *at,
            })
            .collect();
        saved.sort_by(|a, b| {
            b.saved_at
                .cmp(&a.saved_at)
                .then(a.recipe_id.cmp(&b.recipe_id))
        });
        let total = saved.len();
        Ok((saved.into_iter().skip(offset).take(limit).collect(), total))
    }

    async fn record_event(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        kind: EventKind,
        now: DateTime<Utc>,
    ) -> Result<RecordedEvent> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let latest_view = state
            .events
            .iter()
            .filter(|e| {
                e.user_id == user_id && e.recipe_id == recipe_id && e.kind == EventKind::Viewed
            })
            .max_by_key(|e| e.occurred_at)
            .cloned();

        match decide_event(kind, latest_view.as_ref(), now, view_dedup_window()) {
            EventDecision::Collapse(prior) => Ok(RecordedEvent {
                event: prior,
                collapsed: true,
            }),
            EventDecision::Append => {
                let event = HistoryEvent::new(user_id, recipe_id, kind, now);
                state.events.push(event.clone());
                Ok(RecordedEvent {
                    event,
                    collapsed: false,
                })
            }
        }
    }

    async fn touches(
        &self,
        user_id: Uuid,
        recipe_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryEvent>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| {
                e.user_id == user_id && recipe_ids.contains(&e.recipe_id) && e.occurred_at >= since
            })
            .cloned()
            .collect())
    }

    async fn history(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<HistoryEvent>, usize)> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let mut events: Vec<HistoryEvent> = state
            .events
            .iter()
            .filter(|e| e.user_id == user_id && e.occurred_at >= since)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then(a.id.cmp(&b.id)));
        let total = events.len();
        Ok((events.into_iter().skip(offset).take(limit).collect(), total))
    }
}

/// User recipes; approvals land in the shared corpus.
pub struct MemoryUserRecipes {
    recipes: Mutex<HashMap<Uuid, UserRecipe>>,
    corpus: Arc<MemoryCorpus>,
}

impl MemoryUserRecipes {
    pub fn new(corpus: Arc<MemoryCorpus>) -> Self {
        Self {
            recipes: Mutex::new(HashMap::new()),
            corpus,
        }
    }

    fn store_if_current(&self, recipe: &UserRecipe, expected_revision: i32) -> bool {
        let mut recipes = self.recipes.lock().unwrap();
        match recipes.get(&recipe.id) {
            Some(stored) if stored.revision == expected_revision => {
                recipes.insert(recipe.id, recipe.clone());
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl UserRecipeRepository for MemoryUserRecipes {
    async fn insert(&self, recipe: &UserRecipe) -> Result<()> {
        self.recipes
            .lock()
            .unwrap()
            .insert(recipe.id, recipe.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserRecipe>> {
        Ok(self.recipes.lock().unwrap().get(&id).cloned())
    }

    async fn find_shared(&self, slug: &str) -> Result<Option<UserRecipe>> {
        Ok(self
            .recipes
            .lock()
            .unwrap()
            .values()
            .find(|r| {
                r.visibility == recipe_service::models::Visibility::Shared
                    && r.share_slug.as_deref() == Some(slug)
            })
            .cloned())
    }

    async fn update(&self, recipe: &UserRecipe, expected_revision: i32) -> Result<bool> {
        Ok(self.store_if_current(recipe, expected_revision))
    }

    async fn find_recipe(&self, id: Uuid) -> Result<Option<Recipe>> {
        Ok(self.corpus.get(id))
    }

    async fn approve(
        &self,
        recipe: &UserRecipe,
        expected_revision: i32,
        published: &Recipe,
    ) -> Result<bool> {
        if !self.store_if_current(recipe, expected_revision) {
            return Ok(false);
        }
        self.corpus.upsert(published.clone());
        Ok(true)
    }
}

/// Every collaborator of the running app, reachable from tests.
pub struct Harness {
    pub corpus: Arc<MemoryCorpus>,
    pub ledger: Arc<MemoryLedger>,
    pub state: AppState,
    pub limiter: Arc<RateLimiter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(RateLimitConfig::default(), DEFAULT_CANDIDATE_LIMIT)
    }

    pub fn with_rate_limits(limits: RateLimitConfig) -> Self {
        Self::build(limits, DEFAULT_CANDIDATE_LIMIT)
    }

    pub fn with_candidate_limit(candidate_limit: usize) -> Self {
        Self::build(RateLimitConfig::default(), candidate_limit)
    }

    fn build(limits: RateLimitConfig, candidate_limit: usize) -> Self {
        let corpus = Arc::new(MemoryCorpus::default());
        let ledger = Arc::new(MemoryLedger::default());
        let taxonomy = Arc::new(Taxonomy::default());

        let search = Arc::new(SearchService::new(
            corpus.clone(),
            ledger.clone(),
            PopularityBoard::new(),
            ScoringEngine::new(ScoringParams::default()),
            candidate_limit,
        ));
        let curation = Arc::new(CurationService::new(
            Arc::new(MemoryUserRecipes::new(corpus.clone())),
            taxonomy.clone(),
        ));
        let gate = IdempotencyGate::new(
            Arc::new(InMemoryIdempotencyStore::new()),
            StdDuration::from_secs(24 * 3600),
        );
        let store = InMemoryBucketStore::new(&limits).expect("valid rate limit policy");
        let limiter = Arc::new(RateLimiter::new(Arc::new(store), limits));

        let state = AppState {
            corpus: corpus.clone(),
            ledger: ledger.clone(),
            search,
            curation,
            gate,
            taxonomy,
        };

        Self {
            corpus,
            ledger,
            state,
            limiter,
        }
    }

    pub fn add(&self, recipe: Recipe) -> Uuid {
        let id = recipe.id;
        self.corpus.upsert(recipe);
        id
    }

    /// App configuration for `App::new().configure(...)`.
    pub fn config(&self) -> impl FnOnce(&mut web::ServiceConfig) {
        let state = self.state.clone();
        let limiter = self.limiter.clone();
        move |cfg: &mut web::ServiceConfig| {
            configure_extractors(cfg);
            cfg.app_data(web::Data::new(state));
            configure_routes(cfg, limiter);
        }
    }
}
