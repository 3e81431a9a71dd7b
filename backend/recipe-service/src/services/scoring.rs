//! Scoring Engine
//!
//! The composite rank score is a fixed weighted sum of five named signals,
//! each a pure function in `[0, 1]`:
//!
//! ```text
//! score = w_text * text
//!       + w_boost * boost
//!       + w_recency * recency
//!       + w_popularity * popularity
//!       - w_repeat * repeat_penalty
//! ```
//!
//! Every signal is computed for every candidate. A stale popularity snapshot
//! is used as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{EventKind, HistoryEvent, Recipe};
use crate::services::filter_compiler::CompiledFilter;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Named, tunable signal weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub text: f64,
    pub boost: f64,
    pub recency: f64,
    pub popularity: f64,
    pub repeat_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            text: 0.35,
            boost: 0.20,
            recency: 0.20,
            popularity: 0.15,
            repeat_penalty: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in [
            ("text", self.text),
            ("boost", self.boost),
            ("recency", self.recency),
            ("popularity", self.popularity),
            ("repeat_penalty", self.repeat_penalty),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!(
                    "ranking weight '{}' must be finite and >= 0, got {}",
                    name, weight
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    pub weights: ScoringWeights,
    pub recency_half_life_days: f64,
    pub repeat_half_life_days: f64,
    /// Interactions older than this do not contribute to the repeat penalty
    pub repeat_lookback_days: i64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            recency_half_life_days: 14.0,
            repeat_half_life_days: 7.0,
            repeat_lookback_days: 30,
        }
    }
}

/// Raw signal values for one candidate plus their weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalBreakdown {
    pub text: f64,
    pub boost: f64,
    pub recency: f64,
    pub popularity: f64,
    pub repeat_penalty: f64,
    pub score: f64,
}

/// Full-text rank scaled by the best rank among this search's candidates.
pub fn text_signal(rank: f64, best_rank: f64) -> f64 {
    if best_rank <= 0.0 || !rank.is_finite() {
        return 0.0;
    }
    (rank / best_rank).clamp(0.0, 1.0)
}

/// Fraction of requested diet and cuisine tags present on the candidate.
///
/// Diet tags are all present on any surviving candidate, so the signal
/// grows with the number of requested cuisines it also carries.
pub fn boost_signal(filter: &CompiledFilter, recipe: &Recipe) -> f64 {
    let requested = filter.requested_tag_count();
    if requested == 0 {
        return 0.0;
    }
    let matched = filter.diets.iter().filter(|d| recipe.has_diet(d)).count()
        + filter.cuisines.iter().filter(|c| recipe.has_cuisine(c)).count();
    matched as f64 / requested as f64
}

/// Exponential decay on time since `updated_at`: 1.0 when fresh, 0.5 after one half-life.
pub fn recency_signal(updated_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_days = age_days(updated_at, now);
    0.5_f64.powf(age_days / half_life_days)
}

/// Log-scaled share of the corpus maximum.
pub fn popularity_signal(count: u64, max_count: u64) -> f64 {
    if max_count == 0 {
        return 0.0;
    }
    ((1 + count) as f64).ln() / ((1 + max_count) as f64).ln()
}

/// Saturating penalty from the user's prior views and cooks of this recipe.
///
/// Each interaction contributes its kind weight decayed by age; the sum is
/// mapped through `1 - e^-x` so repeated touches raise the penalty with
/// diminishing effect and never exceed 1.
pub fn repeat_penalty_signal<'a>(
    touches: impl IntoIterator<Item = &'a HistoryEvent>,
    now: DateTime<Utc>,
    params: &ScoringParams,
) -> f64 {
    let lookback = params.repeat_lookback_days as f64;
    let pressure: f64 = touches
        .into_iter()
        .map(|event| (event, age_days(event.occurred_at, now)))
        .filter(|(_, age)| *age <= lookback)
        .map(|(event, age)| {
            kind_weight(event.kind) * 0.5_f64.powf(age / params.repeat_half_life_days)
        })
        .sum();
    1.0 - (-pressure).exp()
}

fn kind_weight(kind: EventKind) -> f64 {
    match kind {
        EventKind::Viewed => 1.0,
        EventKind::Cooked => 2.0,
    }
}

fn age_days(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - at).num_milliseconds().max(0) as f64 / 1000.0) / SECONDS_PER_DAY
}

/// A candidate with its signals, ready for ordering.
#[derive(Debug, Clone)]
pub struct ScoredRecipe {
    pub recipe: Recipe,
    pub signals: SignalBreakdown,
}

/// Combines the five signals with fixed weights.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    params: ScoringParams,
}

impl ScoringEngine {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    /// Score one candidate. `text` is its normalized text relevance
    /// (0 when the query had no text).
    #[allow(clippy::too_many_arguments)]
    pub fn score<'a>(
        &self,
        recipe: &Recipe,
        filter: &CompiledFilter,
        text: f64,
        popularity_count: u64,
        popularity_max: u64,
        touches: impl IntoIterator<Item = &'a HistoryEvent>,
        now: DateTime<Utc>,
    ) -> SignalBreakdown {
        let w = &self.params.weights;
        let boost = boost_signal(filter, recipe);
        let recency = recency_signal(recipe.updated_at, now, self.params.recency_half_life_days);
        let popularity = popularity_signal(popularity_count, popularity_max);
        let repeat_penalty = repeat_penalty_signal(touches, now, &self.params);

        let score = w.text * text + w.boost * boost + w.recency * recency
            + w.popularity * popularity
            - w.repeat_penalty * repeat_penalty;

        SignalBreakdown {
            text,
            boost,
            recency,
            popularity,
            repeat_penalty,
            score,
        }
    }
}
