//! PostgreSQL interaction ledger.
//!
//! Membership compare-and-set relies on the `(user_id, recipe_id)` primary
//! key of `saved_recipes`: inserting an existing row or deleting a missing
//! one affects zero rows, which is exactly a failed CAS. View collapsing
//! serializes per `(user, recipe)` with a transaction-scoped advisory lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::decode_enum;
use crate::error::Result;
use crate::models::{EventKind, HistoryEvent, Membership, SavedRecipe};
use crate::services::ledger::{
    decide_event, view_dedup_window, CasOutcome, EventDecision, InteractionLedger,
    RecordedEvent, SaveTransition,
};

#[derive(Clone)]
pub struct PgInteractionLedger {
    pool: PgPool,
}

impl PgInteractionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn event_from_row(row: &PgRow) -> std::result::Result<HistoryEvent, sqlx::Error> {
    Ok(HistoryEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        recipe_id: row.try_get("recipe_id")?,
        kind: decode_enum(row, "kind")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

#[async_trait]
impl InteractionLedger for PgInteractionLedger {
    async fn membership(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Membership> {
        let saved: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM saved_recipes WHERE user_id = $1 AND recipe_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(recipe_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Membership::from_saved(saved))
    }

    async fn compare_and_set_membership(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        transition: SaveTransition,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome> {
        let affected = match (transition.from, transition.to) {
            (Membership::NotSaved, Membership::Saved) => sqlx::query(
                r#"
                INSERT INTO saved_recipes (user_id, recipe_id, saved_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, recipe_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(recipe_id)
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            (Membership::Saved, Membership::NotSaved) => sqlx::query(
                r#"
                DELETE FROM saved_recipes
                WHERE user_id = $1 AND recipe_id = $2
                "#,
            )
            .bind(user_id)
            .bind(recipe_id)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            // from == to: succeeds iff the stored state already matches
            (from, _) => {
                let actual = self.membership(user_id, recipe_id).await?;
                return Ok(if actual == from {
                    CasOutcome::Applied
                } else {
                    CasOutcome::Conflict(actual)
                });
            }
        };

        if affected == 1 {
            Ok(CasOutcome::Applied)
        } else {
            // Zero rows: the stored state is already the target state.
            Ok(CasOutcome::Conflict(transition.to))
        }
    }

    async fn saved(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SavedRecipe>, usize)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM saved_recipes WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT user_id, recipe_id, saved_at
            FROM saved_recipes
            WHERE user_id = $1
            ORDER BY saved_at DESC, recipe_id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let saved = rows
            .iter()
            .map(|row| {
                Ok(SavedRecipe {
                    user_id: row.try_get("user_id")?,
                    recipe_id: row.try_get("recipe_id")?,
                    saved_at: row.try_get("saved_at")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok((saved, total as usize))
    }

    async fn record_event(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        kind: EventKind,
        now: DateTime<Utc>,
    ) -> Result<RecordedEvent> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("history:{}:{}", user_id, recipe_id))
            .execute(&mut *tx)
            .await?;

        let latest_view = if kind == EventKind::Viewed {
            sqlx::query(
                r#"
                SELECT id, user_id, recipe_id, kind, occurred_at
                FROM history_events
                WHERE user_id = $1 AND recipe_id = $2 AND kind = 'viewed'
                ORDER BY occurred_at DESC
                LIMIT 1
                "#,
            )
            .bind(user_id)
            .bind(recipe_id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(event_from_row)
            .transpose()?
        } else {
            None
        };

        let recorded = match decide_event(kind, latest_view.as_ref(), now, view_dedup_window()) {
            EventDecision::Collapse(prior) => {
                debug!(
                    user_id = %user_id,
                    recipe_id = %recipe_id,
                    "View collapsed into earlier view"
                );
                RecordedEvent {
                    event: prior,
                    collapsed: true,
                }
            }
            EventDecision::Append => {
                let event = HistoryEvent::new(user_id, recipe_id, kind, now);
                sqlx::query(
                    r#"
                    INSERT INTO history_events (id, user_id, recipe_id, kind, occurred_at)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(event.id)
                .bind(event.user_id)
                .bind(event.recipe_id)
                .bind(event.kind.as_str())
                .bind(event.occurred_at)
                .execute(&mut *tx)
                .await?;
                RecordedEvent {
                    event,
                    collapsed: false,
                }
            }
        };

        tx.commit().await?;
        Ok(recorded)
    }

    async fn touches(
        &self,
        user_id: Uuid,
        recipe_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, recipe_id, kind, occurred_at
            FROM history_events
            WHERE user_id = $1 AND recipe_id = ANY($2) AND occurred_at >= $3
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(recipe_ids)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(event_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }

    async fn history(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<HistoryEvent>, usize)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM history_events WHERE user_id = $1 AND occurred_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, recipe_id, kind, occurred_at
            FROM history_events
            WHERE user_id = $1 AND occurred_at >= $2
            ORDER BY occurred_at DESC, id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .iter()
            .map(event_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((events, total as usize))
    }
}
