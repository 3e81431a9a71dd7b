use std::sync::Arc;
use std::time::Duration;

use actix_middleware::RateLimiter;
use idempotency_gate::IdempotencyGate;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info};

/// Hourly housekeeping for the mutation layer's own state.
///
/// Expired idempotency records are deleted so the table stays bounded by
/// one replay window of traffic, and idle in-process rate-limit buckets are
/// dropped.
pub struct IdempotencyCleanupJob {
    gate: IdempotencyGate,
    limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl IdempotencyCleanupJob {
    pub fn new(gate: IdempotencyGate, limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self {
            gate,
            limiter,
            interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        info!(
            interval_secs = self.interval.as_secs(),
            "Idempotency cleanup job started"
        );

        loop {
            ticker.tick().await;

            match self.gate.purge_expired().await {
                Ok(purged) => debug!(purged, "Idempotency cleanup completed"),
                Err(err) => error!(error = %err, "Idempotency cleanup failed"),
            }
            self.limiter.prune();
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
