//! Popularity snapshot
//!
//! The 30-day interaction aggregate is recomputed off the write path by
//! `jobs::popularity_refresh` and swapped in whole. Readers take an `Arc`
//! to the current snapshot and never wait on a refresh.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct PopularitySnapshot {
    counts: HashMap<Uuid, u64>,
    max: u64,
    /// `None` until the first successful refresh
    pub computed_at: Option<DateTime<Utc>>,
}

impl PopularitySnapshot {
    pub fn new(counts: HashMap<Uuid, u64>, computed_at: DateTime<Utc>) -> Self {
        let max = counts.values().copied().max().unwrap_or(0);
        Self {
            counts,
            max,
            computed_at: Some(computed_at),
        }
    }

    pub fn count(&self, recipe_id: &Uuid) -> u64 {
        self.counts.get(recipe_id).copied().unwrap_or(0)
    }

    /// Largest count in the snapshot, the normalization ceiling.
    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Where fresh aggregates come from.
#[async_trait]
pub trait PopularitySource: Send + Sync {
    /// Recompute interaction counts per recipe over the trailing `window_days`.
    async fn recompute(&self, window_days: i64, now: DateTime<Utc>) -> Result<HashMap<Uuid, u64>>;
}

/// Shared holder of the current snapshot.
#[derive(Clone, Default)]
pub struct PopularityBoard {
    current: Arc<RwLock<Arc<PopularitySnapshot>>>,
}

impl PopularityBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Arc<PopularitySnapshot> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, snapshot: PopularitySnapshot) {
        *self.current.write().await = Arc::new(snapshot);
    }

    /// Pull a fresh aggregate from `source`. On error the previous snapshot stays.
    pub async fn refresh(
        &self,
        source: &dyn PopularitySource,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let counts = source.recompute(window_days, now).await?;
        let snapshot = PopularitySnapshot::new(counts, now);
        let size = snapshot.len();
        info!(
            recipes = size,
            max_count = snapshot.max(),
            "Popularity snapshot refreshed"
        );
        self.replace(snapshot).await;
        Ok(size)
    }
}
