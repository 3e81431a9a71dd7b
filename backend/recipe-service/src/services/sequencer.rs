//! Tie-Break Sequencer
//!
//! Imposes a total order on scored candidates and slices it into pages.
//! Every sort mode ends in the same chain (`updated_at` desc, id asc), and
//! the id is unique, so a fixed snapshot always yields the same order and
//! consecutive offsets never overlap or skip.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::services::scoring::ScoredRecipe;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Relevance,
    Newest,
    Quickest,
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(SortMode::Relevance),
            "newest" => Ok(SortMode::Newest),
            "quickest" => Ok(SortMode::Quickest),
            other => Err(format!("unknown sort mode '{}'", other)),
        }
    }
}

/// Effective page window. Oversized limits are clamped, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
    /// The caller asked for more than `MAX_LIMIT`
    pub clamped: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, 0)
    }
}

impl PageRequest {
    /// `limit` is expected to be >= 1 and `offset` >= 0; validation happens upstream.
    pub fn new(limit: Option<i64>, offset: i64) -> Self {
        let requested = limit.unwrap_or(DEFAULT_LIMIT as i64).max(1);
        let clamped = requested > MAX_LIMIT as i64;
        Self {
            limit: requested.min(MAX_LIMIT as i64) as usize,
            offset: offset.max(0) as usize,
            clamped,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
            has_more: self.has_more,
        }
    }
}

/// Slice an already ordered list.
pub fn paginate<T>(ordered: Vec<T>, page: PageRequest) -> Page<T> {
    let total = ordered.len();
    let items: Vec<T> = ordered
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();
    Page {
        has_more: page.offset.saturating_add(items.len()) < total,
        items,
        total,
        limit: page.limit,
        offset: page.offset,
    }
}

/// Sort in place into the mode's total order.
pub fn order(candidates: &mut [ScoredRecipe], mode: SortMode) {
    candidates.sort_by(|a, b| compare(a, b, mode));
}

fn compare(a: &ScoredRecipe, b: &ScoredRecipe, mode: SortMode) -> Ordering {
    let by_score = || b.signals.score.total_cmp(&a.signals.score);
    let primary = match mode {
        SortMode::Relevance => by_score(),
        SortMode::Newest => Ordering::Equal,
        SortMode::Quickest => a
            .recipe
            .total_minutes()
            .cmp(&b.recipe.total_minutes())
            .then_with(by_score),
    };
    primary
        .then_with(|| b.recipe.updated_at.cmp(&a.recipe.updated_at))
        .then_with(|| a.recipe.id.cmp(&b.recipe.id))
}
