use actix_middleware::UserId;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::metrics::SEARCH_REQUESTS_TOTAL;
use crate::services::filter_compiler::{self, RawSearchQuery};
use crate::services::scoring::{ScoredRecipe, SignalBreakdown};
use crate::services::sequencer::Page;
use crate::AppState;

/// Ranked list entry.
#[derive(Debug, Serialize)]
pub struct RecipeSummary {
    pub id: Uuid,
    pub title: String,
    pub total_minutes: i32,
    pub cuisines: Vec<String>,
    pub diet_tags: Vec<String>,
    pub calories: f64,
    pub protein_g: f64,
    pub updated_at: DateTime<Utc>,
    pub score: f64,
    pub signals: Signals,
}

#[derive(Debug, Serialize)]
pub struct Signals {
    pub text: f64,
    pub boost: f64,
    pub recency: f64,
    pub popularity: f64,
    pub repeat_penalty: f64,
}

impl From<SignalBreakdown> for Signals {
    fn from(s: SignalBreakdown) -> Self {
        Self {
            text: s.text,
            boost: s.boost,
            recency: s.recency,
            popularity: s.popularity,
            repeat_penalty: s.repeat_penalty,
        }
    }
}

impl From<ScoredRecipe> for RecipeSummary {
    fn from(scored: ScoredRecipe) -> Self {
        let ScoredRecipe { recipe, signals } = scored;
        Self {
            id: recipe.id,
            total_minutes: recipe.total_minutes(),
            title: recipe.content.title,
            cuisines: recipe.content.cuisines,
            diet_tags: recipe.content.diet_tags,
            calories: recipe.content.nutrition.calories,
            protein_g: recipe.content.nutrition.protein_g,
            updated_at: recipe.updated_at,
            score: signals.score,
            signals: signals.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    #[serde(flatten)]
    pub page: Page<RecipeSummary>,
    /// The requested limit exceeded the maximum and was lowered
    pub limit_clamped: bool,
}

/// GET /api/v1/recipes/search
pub async fn search_recipes(
    state: web::Data<AppState>,
    user_id: UserId,
    query: web::Query<RawSearchQuery>,
) -> Result<HttpResponse> {
    let request = match filter_compiler::compile(&query, &state.taxonomy) {
        Ok(request) => request,
        Err(violations) => {
            debug!(
                user_id = %user_id.0,
                violations = violations.len(),
                "Rejected search query"
            );
            SEARCH_REQUESTS_TOTAL.with_label_values(&["invalid"]).inc();
            return Err(AppError::Validation(violations));
        }
    };

    let page = state.search.search(user_id.0, &request, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(SearchResponse {
        page: page.map(RecipeSummary::from),
        limit_clamped: request.page.clamped,
    }))
}
