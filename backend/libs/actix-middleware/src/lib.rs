//! # Actix Middleware Library
//!
//! Shared middleware for Nova Actix services
//!
//! ## Modules
//! - `requester`: requester identity from the trusted edge headers
//! - `correlation_id`: request correlation IDs
//! - `rate_limit`: per-requester token bucket admission control
//! - `bucket_store`: in-process and Redis token bucket stores
//! - `metrics`: Prometheus counters for admission decisions

pub mod bucket_store;
pub mod correlation_id;
pub mod metrics;
pub mod rate_limit;
pub mod requester;

mod problem;

pub use bucket_store::{
    BucketKey, BucketStore, BucketStoreError, InMemoryBucketStore, RateDecision, RedisBucketStore,
};
pub use correlation_id::{CorrelationId, CorrelationIdMiddleware};
pub use rate_limit::{ClassPolicy, EndpointClass, RateLimitConfig, RateLimitMiddleware, RateLimiter};
pub use requester::{RequesterIdentity, RequesterRoles, UserId};
