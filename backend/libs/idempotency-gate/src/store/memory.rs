//! In-process record store backed by `DashMap`.
//!
//! Suitable for a single instance or for tests. `DashMap::entry` holds the
//! shard lock for the whole insert-if-absent, which gives per-key atomicity
//! without a global lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{BeginOutcome, IdempotencyRecord, IdempotencyStore, RecordScope, RecordState};
use crate::{Fingerprint, IdempotencyResult, StoredResponse};

#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    records: Arc<DashMap<RecordScope, IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn begin(
        &self,
        scope: &RecordScope,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> IdempotencyResult<BeginOutcome> {
        match self.records.entry(scope.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(cutoff) {
                    debug!(key = %scope.key, "Replacing expired idempotency record");
                    occupied.insert(IdempotencyRecord::in_flight(
                        scope.clone(),
                        fingerprint.clone(),
                        now,
                    ));
                    Ok(BeginOutcome::Started)
                } else {
                    Ok(BeginOutcome::Existing(occupied.get().clone()))
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(IdempotencyRecord::in_flight(
                    scope.clone(),
                    fingerprint.clone(),
                    now,
                ));
                Ok(BeginOutcome::Started)
            }
        }
    }

    async fn complete(
        &self,
        scope: &RecordScope,
        response: &StoredResponse,
    ) -> IdempotencyResult<()> {
        if let Some(mut record) = self.records.get_mut(scope) {
            record.state = RecordState::Completed(response.clone());
        }
        Ok(())
    }

    async fn release(&self, scope: &RecordScope) -> IdempotencyResult<()> {
        self.records
            .remove_if(scope, |_, record| record.state == RecordState::InFlight);
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> IdempotencyResult<u64> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(cutoff));
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}
