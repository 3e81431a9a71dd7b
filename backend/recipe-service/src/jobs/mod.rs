/// Background jobs
///
/// - `popularity_refresh`: recomputes the 30-day interaction aggregate
/// - `idempotency_cleanup`: purges expired idempotency records and idle rate-limit buckets
pub mod idempotency_cleanup;
pub mod popularity_refresh;

pub use idempotency_cleanup::IdempotencyCleanupJob;
pub use popularity_refresh::PopularityRefreshJob;
