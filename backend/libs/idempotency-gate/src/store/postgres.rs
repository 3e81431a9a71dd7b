//! PostgreSQL record store.
//!
//! Shared across service instances. Atomicity comes from the primary key on
//! `(requester, idem_key)`: the claim is an `INSERT ... ON CONFLICT DO
//! NOTHING` and only the inserting request sees `rows_affected() == 1`.
//!
//! The table is created by the owning service's migrations
//! (`recipe-service/migrations/002_create_idempotency_records_table.sql`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use super::{BeginOutcome, IdempotencyRecord, IdempotencyStore, RecordScope, RecordState};
use crate::{Fingerprint, IdempotencyResult, StoredResponse};

#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
}

impl PgIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, scope: &RecordScope) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT fingerprint, state, response_status, response_body, created_at
            FROM idempotency_records
            WHERE requester = $1 AND idem_key = $2
            "#,
        )
        .bind(&scope.requester)
        .bind(&scope.key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state: String = row.try_get("state")?;
        let state = if state == "completed" {
            let status: i16 = row.try_get("response_status")?;
            let body: Option<serde_json::Value> = row.try_get("response_body")?;
            RecordState::Completed(StoredResponse::new(
                status as u16,
                body.unwrap_or(serde_json::Value::Null),
            ))
        } else {
            RecordState::InFlight
        };

        Ok(Some(IdempotencyRecord {
            scope: scope.clone(),
            fingerprint: Fingerprint::from_hex(row.try_get::<String, _>("fingerprint")?),
            state,
            created_at: row.try_get("created_at")?,
        }))
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn begin(
        &self,
        scope: &RecordScope,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> IdempotencyResult<BeginOutcome> {
        // Expired records free the key for a new request.
        sqlx::query(
            r#"
            DELETE FROM idempotency_records
            WHERE requester = $1 AND idem_key = $2 AND created_at < $3
            "#,
        )
        .bind(&scope.requester)
        .bind(&scope.key)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_records (requester, idem_key, fingerprint, state, created_at)
            VALUES ($1, $2, $3, 'in_flight', $4)
            ON CONFLICT (requester, idem_key) DO NOTHING
            "#,
        )
        .bind(&scope.requester)
        .bind(&scope.key)
        .bind(fingerprint.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            return Ok(BeginOutcome::Started);
        }

        match self.fetch(scope).await? {
            Some(record) => Ok(BeginOutcome::Existing(record)),
            // Released between our insert attempt and the read; the key is
            // free again, so report it as in flight and let the gate retry.
            None => {
                debug!(key = %scope.key, "Idempotency record vanished during claim");
                Ok(BeginOutcome::Existing(IdempotencyRecord::in_flight(
                    scope.clone(),
                    fingerprint.clone(),
                    now,
                )))
            }
        }
    }

    async fn complete(
        &self,
        scope: &RecordScope,
        response: &StoredResponse,
    ) -> IdempotencyResult<()> {
        sqlx::query(
            r#"
            UPDATE idempotency_records
            SET state = 'completed', response_status = $3, response_body = $4, completed_at = NOW()
            WHERE requester = $1 AND idem_key = $2
            "#,
        )
        .bind(&scope.requester)
        .bind(&scope.key)
        .bind(response.status as i16)
        .bind(&response.body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release(&self, scope: &RecordScope) -> IdempotencyResult<()> {
        sqlx::query(
            r#"
            DELETE FROM idempotency_records
            WHERE requester = $1 AND idem_key = $2 AND state = 'in_flight'
            "#,
        )
        .bind(&scope.requester)
        .bind(&scope.key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> IdempotencyResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_records
            WHERE created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let deleted_count = result.rows_affected();
        if deleted_count > 0 {
            info!(
                deleted_count = deleted_count,
                cutoff_time = %cutoff,
                "Purged expired idempotency records"
            );
        }

        Ok(deleted_count)
    }
}
