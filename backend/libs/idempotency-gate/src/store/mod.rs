//! Record store contract
//!
//! The gate only needs one atomic primitive from storage: *insert the record
//! for `(requester, key)` unless a live one already exists*. Everything else
//! (replay, conflict detection, waiting on in-flight work) is decided by the
//! gate from the record returned by [`IdempotencyStore::begin`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Fingerprint, IdempotencyResult, StoredResponse};

mod memory;
mod postgres;

pub use memory::InMemoryIdempotencyStore;
pub use postgres::PgIdempotencyStore;

/// Records are scoped per requester; two users may pick the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordScope {
    pub requester: String,
    pub key: String,
}

impl RecordScope {
    pub fn new(requester: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordState {
    /// The owning request is still executing the operation
    InFlight,
    /// The operation finished; its response is replayed verbatim
    Completed(StoredResponse),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub scope: RecordScope,
    pub fingerprint: Fingerprint,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn in_flight(scope: RecordScope, fingerprint: Fingerprint, now: DateTime<Utc>) -> Self {
        Self {
            scope,
            fingerprint,
            state: RecordState::InFlight,
            created_at: now,
        }
    }

    /// A record created before `cutoff` is outside the replay window.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }
}

/// Outcome of the atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// No live record existed; the caller now owns the key.
    Started,
    /// A live record exists (in flight or completed).
    Existing(IdempotencyRecord),
}

/// Storage for idempotency records.
///
/// Implementations must make `begin` atomic per scope: two concurrent calls
/// for the same scope must never both observe `Started`.
#[async_trait]
pub trait IdempotencyStore: Send + Sync + 'static {
    /// Claim `scope` for a new request unless a record newer than `cutoff`
    /// exists. Expired records are replaced.
    async fn begin(
        &self,
        scope: &RecordScope,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> IdempotencyResult<BeginOutcome>;

    /// Store the final response of the owning request.
    async fn complete(&self, scope: &RecordScope, response: &StoredResponse)
        -> IdempotencyResult<()>;

    /// Drop an in-flight claim so the key can be retried.
    async fn release(&self, scope: &RecordScope) -> IdempotencyResult<()>;

    /// Delete records created before `cutoff`; returns the number removed.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> IdempotencyResult<u64>;
}
