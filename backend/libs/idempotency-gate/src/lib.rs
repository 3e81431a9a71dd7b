//! # Idempotency Gate
//!
//! Makes mutating HTTP requests safe under client retry and replay. A client
//! attaches an `Idempotency-Key` to a POST/PUT/PATCH; the gate guarantees the
//! wrapped operation runs at most once per `(requester, key)` inside the
//! replay window and that every retry receives the first response verbatim.
//!
//! ## Contract
//!
//! `execute(key, requester, fingerprint, operation)`:
//!
//! | Record for key            | Action                                        |
//! |---------------------------|-----------------------------------------------|
//! | none (or expired)         | run operation, store response, return it      |
//! | completed, same print     | return stored response, operation not run     |
//! | in flight, same print     | wait for completion, then replay              |
//! | any, different print      | [`IdempotencyError::KeyReused`]               |
//!
//! Without a key the gate is a pass-through.
//!
//! ## Architecture
//!
//! ```text
//! handler → IdempotencyGate::execute ──begin──▶ IdempotencyStore
//!                  │                               (memory | postgres)
//!                  └─ tokio::spawn(operation) ─complete/release─▶ store
//! ```
//!
//! The operation is spawned on its own task once the key has been claimed,
//! so a client disconnect cannot leave the key claimed by work that never
//! finishes.
//!
//! ## Usage
//!
//! ```ignore
//! use idempotency_gate::{Fingerprint, IdempotencyGate, InMemoryIdempotencyStore, StoredResponse};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let gate = IdempotencyGate::new(
//!     Arc::new(InMemoryIdempotencyStore::new()),
//!     Duration::from_secs(24 * 3600),
//! );
//! let fingerprint = Fingerprint::of_request("PUT", "/recipes/1/save", &serde_json::Value::Null);
//!
//! let outcome = gate
//!     .execute(Some("key-1"), "user-1", &fingerprint, async {
//!         Ok::<_, std::io::Error>(StoredResponse::new(200, serde_json::json!({"saved": true})))
//!     })
//!     .await?;
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

mod error;
mod fingerprint;
pub mod store;

pub use error::{GateError, IdempotencyError, IdempotencyResult};
pub use fingerprint::Fingerprint;
pub use store::{
    BeginOutcome, IdempotencyRecord, IdempotencyStore, InMemoryIdempotencyStore,
    PgIdempotencyStore, RecordScope, RecordState,
};

/// Maximum accepted key length.
pub const MAX_KEY_LEN: usize = 255;

/// Response captured from the first execution and replayed on retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl StoredResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// Server-side failures are not recorded; the client may retry them.
    pub fn is_replayable(&self) -> bool {
        self.status < 500
    }
}

/// Result of passing a request through the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// The operation ran for this request
    Executed(StoredResponse),
    /// A prior response was returned; the operation did not run
    Replayed(StoredResponse),
}

impl GateOutcome {
    pub fn response(&self) -> &StoredResponse {
        match self {
            GateOutcome::Executed(resp) | GateOutcome::Replayed(resp) => resp,
        }
    }

    pub fn into_response(self) -> StoredResponse {
        match self {
            GateOutcome::Executed(resp) | GateOutcome::Replayed(resp) => resp,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, GateOutcome::Replayed(_))
    }
}

/// Tuning for waiting on in-flight duplicates.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// How long records stay eligible for replay
    pub replay_window: Duration,
    /// How long a duplicate waits for the owning request to finish
    pub in_flight_wait: Duration,
    /// Poll interval while waiting
    pub poll_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            replay_window: Duration::from_secs(24 * 3600),
            in_flight_wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Idempotency gate over a swappable record store.
///
/// Cheap to clone; share one instance across workers.
#[derive(Clone)]
pub struct IdempotencyGate {
    store: Arc<dyn IdempotencyStore>,
    config: GateConfig,
}

impl IdempotencyGate {
    /// Create a gate with the given replay window and default wait tuning.
    pub fn new(store: Arc<dyn IdempotencyStore>, replay_window: Duration) -> Self {
        Self::with_config(
            store,
            GateConfig {
                replay_window,
                ..GateConfig::default()
            },
        )
    }

    pub fn with_config(store: Arc<dyn IdempotencyStore>, config: GateConfig) -> Self {
        Self { store, config }
    }

    pub fn replay_window(&self) -> Duration {
        self.config.replay_window
    }

    /// Run `operation` at most once per `(requester, key)`.
    ///
    /// `operation` must be `'static` because it is moved onto its own task
    /// after the key is claimed.
    pub async fn execute<Fut, E>(
        &self,
        key: Option<&str>,
        requester: &str,
        fingerprint: &Fingerprint,
        operation: Fut,
    ) -> Result<GateOutcome, GateError<E>>
    where
        Fut: Future<Output = Result<StoredResponse, E>> + Send + 'static,
        E: Send + 'static,
    {
        let Some(key) = key else {
            return operation
                .await
                .map(GateOutcome::Executed)
                .map_err(GateError::Operation);
        };

        validate_key(key)?;
        let scope = RecordScope::new(requester, key);

        if let Some(replayed) = self.claim(&scope, fingerprint).await? {
            return Ok(replayed);
        }

        let store = self.store.clone();
        let task_scope = scope.clone();
        let handle = tokio::spawn(async move {
            let result = operation.await;
            let recorded = match &result {
                Ok(response) if response.is_replayable() => {
                    store.complete(&task_scope, response).await
                }
                _ => store.release(&task_scope).await,
            };
            if let Err(err) = recorded {
                warn!(
                    key = %task_scope.key,
                    error = %err,
                    "Failed to record idempotent operation outcome"
                );
            }
            result
        });

        match handle.await {
            Ok(Ok(response)) => {
                info!(
                    key = %scope.key,
                    status = response.status,
                    "Idempotent operation executed"
                );
                Ok(GateOutcome::Executed(response))
            }
            Ok(Err(err)) => Err(GateError::Operation(err)),
            Err(join_err) => {
                // The task released nothing if it panicked; free the key.
                if let Err(err) = self.store.release(&scope).await {
                    warn!(key = %scope.key, error = %err, "Failed to release key after panic");
                }
                Err(IdempotencyError::TaskFailed(join_err.to_string()).into())
            }
        }
    }

    /// Claim the key, or resolve to a replay / conflict.
    ///
    /// Returns `Ok(None)` when this request now owns the key.
    async fn claim(
        &self,
        scope: &RecordScope,
        fingerprint: &Fingerprint,
    ) -> IdempotencyResult<Option<GateOutcome>> {
        let started = Instant::now();
        let window = chrono::Duration::from_std(self.config.replay_window)
            .map_err(|e| IdempotencyError::StoreUnavailable(format!("invalid window: {}", e)))?;

        loop {
            let now = Utc::now();
            match self.store.begin(scope, fingerprint, now, now - window).await? {
                BeginOutcome::Started => return Ok(None),
                BeginOutcome::Existing(record) => {
                    if &record.fingerprint != fingerprint {
                        warn!(
                            key = %scope.key,
                            requester = %scope.requester,
                            "Idempotency key reused with a different request"
                        );
                        return Err(IdempotencyError::KeyReused);
                    }

                    match record.state {
                        RecordState::Completed(response) => {
                            debug!(key = %scope.key, "Replaying stored response");
                            return Ok(Some(GateOutcome::Replayed(response)));
                        }
                        RecordState::InFlight => {
                            if started.elapsed() >= self.config.in_flight_wait {
                                return Err(IdempotencyError::InProgress);
                            }
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    /// Delete records older than the replay window.
    pub async fn purge_expired(&self) -> IdempotencyResult<u64> {
        let window = chrono::Duration::from_std(self.config.replay_window)
            .map_err(|e| IdempotencyError::StoreUnavailable(format!("invalid window: {}", e)))?;
        self.store.purge_expired(Utc::now() - window).await
    }
}

/// Validate key format: 1..=255 visible ASCII characters.
pub fn validate_key(key: &str) -> IdempotencyResult<()> {
    if key.is_empty() {
        return Err(IdempotencyError::InvalidKey(
            "Idempotency key cannot be empty".to_string(),
        ));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(IdempotencyError::InvalidKey(format!(
            "Idempotency key too long: {} characters (max {})",
            key.len(),
            MAX_KEY_LEN
        )));
    }

    if !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(IdempotencyError::InvalidKey(
            "Idempotency key must contain visible ASCII characters only".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("a").is_ok());
        assert!(validate_key("9f1c-4b2e").is_ok());
        assert!(validate_key(&"x".repeat(255)).is_ok());

        let err = validate_key("").unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidKey(_)));

        let err = validate_key(&"x".repeat(256)).unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidKey(_)));

        let err = validate_key("has space").unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidKey(_)));
    }

    #[test]
    fn test_gate_outcome() {
        let resp = StoredResponse::new(200, serde_json::json!({"saved": true}));
        assert!(!GateOutcome::Executed(resp.clone()).is_replay());
        assert!(GateOutcome::Replayed(resp.clone()).is_replay());
        assert_eq!(GateOutcome::Replayed(resp.clone()).into_response(), resp);
    }

    #[test]
    fn test_server_errors_are_not_replayable() {
        assert!(StoredResponse::new(201, serde_json::Value::Null).is_replayable());
        assert!(StoredResponse::new(422, serde_json::Value::Null).is_replayable());
        assert!(!StoredResponse::new(503, serde_json::Value::Null).is_replayable());
    }
}
