use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::services::popularity::PopularitySource;

/// Rebuilds `recipe_popularity` from the trailing window of saves, views
/// and cooks, then reads it back.
#[derive(Clone)]
pub struct PgPopularitySource {
    pool: PgPool,
}

impl PgPopularitySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PopularitySource for PgPopularitySource {
    async fn recompute(&self, window_days: i64, now: DateTime<Utc>) -> Result<HashMap<Uuid, u64>> {
        let cutoff = now - Duration::days(window_days);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipe_popularity")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO recipe_popularity (recipe_id, interactions, computed_at)
            SELECT recipe_id, COUNT(*), $2
            FROM (
                SELECT recipe_id FROM history_events WHERE occurred_at >= $1
                UNION ALL
                SELECT recipe_id FROM saved_recipes WHERE saved_at >= $1
            ) AS interactions
            GROUP BY recipe_id
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let rows = sqlx::query("SELECT recipe_id, interactions FROM recipe_popularity")
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let recipe_id: Uuid = row.try_get("recipe_id")?;
            let interactions: i64 = row.try_get("interactions")?;
            counts.insert(recipe_id, interactions.max(0) as u64);
        }
        Ok(counts)
    }
}
