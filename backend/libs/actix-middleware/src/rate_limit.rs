//! Per-requester admission control
//!
//! Every response in a limited scope carries `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset`; rejections also carry
//! `Retry-After`. When the bucket store cannot answer within
//! `store_timeout_ms` the request is rejected with 503 (fail closed).

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
    Error, HttpMessage,
};
use error_types::ProblemDetails;
use futures::future::{ready, LocalBoxFuture, Ready};
use serde::Deserialize;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::bucket_store::{BucketKey, BucketStore, BucketStoreError, RateDecision};
use crate::metrics::RATE_LIMIT_DECISIONS_TOTAL;
use crate::problem::ProblemResponse;
use crate::requester::{has_valid_identity, UserId};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Retry hint sent when the store itself is unavailable.
const STORE_UNAVAILABLE_RETRY_SECS: u64 = 1;

/// Endpoint classes with separate buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    /// Searches, lookups and cheap interaction writes
    Read,
    /// Creating, editing and submitting user recipes
    HeavyWrite,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Read => "read",
            EndpointClass::HeavyWrite => "heavy_write",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClassPolicy {
    pub capacity: u32,
    pub refill_per_minute: u32,
}

impl ClassPolicy {
    /// Time to refill one token.
    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(60) / self.refill_per_minute.max(1)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    pub read: ClassPolicy,
    pub heavy_write: ClassPolicy,
    /// Bucket store timeout in milliseconds
    pub store_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            read: ClassPolicy {
                capacity: 60,
                refill_per_minute: 60,
            },
            heavy_write: ClassPolicy {
                capacity: 6,
                refill_per_minute: 6,
            },
            store_timeout_ms: 100,
        }
    }
}

impl RateLimitConfig {
    pub fn policy(&self, class: EndpointClass) -> ClassPolicy {
        match class {
            EndpointClass::Read => self.read,
            EndpointClass::HeavyWrite => self.heavy_write,
        }
    }
}

/// Bucket store plus the policy it enforces; shared by every scope.
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn BucketStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check(
        &self,
        requester: &str,
        class: EndpointClass,
    ) -> Result<RateDecision, BucketStoreError> {
        let limit = Duration::from_millis(self.config.store_timeout_ms);
        let key = BucketKey::new(requester, class);

        match timeout(limit, self.store.take(&key)).await {
            Ok(result) => result,
            Err(_) => Err(BucketStoreError::Timeout(limit)),
        }
    }

    pub fn prune(&self) {
        self.store.prune();
    }
}

/// Rate limit one scope under one endpoint class.
///
/// Register inside `RequesterIdentity` so the bucket is keyed by user id;
/// anonymous requests fall back to the client address.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    class: EndpointClass,
    unidentified_only: bool,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>, class: EndpointClass) -> Self {
        Self {
            limiter,
            class,
            unidentified_only: false,
        }
    }

    /// Read limiter for requests without a well-formed `X-User-Id`.
    ///
    /// Register outside `RequesterIdentity::required()` so its 401s are
    /// charged to the client address and carry telemetry. Identified
    /// requests pass through uncharged.
    pub fn unidentified(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            class: EndpointClass::Read,
            unidentified_only: true,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            class: self.class,
            unidentified_only: self.unidentified_only,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    class: EndpointClass,
    unidentified_only: bool,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let class = self.class;
        let skip = self.unidentified_only && has_valid_identity(&req);

        Box::pin(async move {
            if skip {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let requester = requester_key(&req);
            let policy = limiter.config().policy(class);

            let decision = match limiter.check(&requester, class).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(
                        class = class.as_str(),
                        error = %e,
                        "Rate limit store unavailable, rejecting request"
                    );
                    record(class, "unavailable");
                    let mut headers = telemetry_headers(policy.capacity, 0, STORE_UNAVAILABLE_RETRY_SECS);
                    headers.push((RETRY_AFTER, STORE_UNAVAILABLE_RETRY_SECS.into()));
                    let problem =
                        ProblemDetails::dependency_unavailable("rate limiter", STORE_UNAVAILABLE_RETRY_SECS)
                            .with_instance(req.path());
                    let response =
                        req.error_response(ProblemResponse::new(problem).with_headers(headers));
                    return Ok(response.map_into_right_body());
                }
            };

            let headers = telemetry_headers(decision.limit, decision.remaining, decision.reset_secs());

            if !decision.allowed {
                let retry_after = decision.retry_after_secs();
                tracing::warn!(
                    requester = %requester,
                    class = class.as_str(),
                    retry_after_secs = retry_after,
                    "Rate limit exceeded"
                );
                record(class, "rejected");
                let mut headers = headers;
                headers.push((RETRY_AFTER, retry_after.into()));
                let problem = ProblemDetails::rate_limited(retry_after).with_instance(req.path());
                let response = req.error_response(ProblemResponse::new(problem).with_headers(headers));
                return Ok(response.map_into_right_body());
            }

            record(class, "allowed");
            let mut res = service.call(req).await?;
            apply_headers(res.headers_mut(), headers);
            Ok(res.map_into_left_body())
        })
    }
}

fn requester_key(req: &ServiceRequest) -> String {
    if let Some(user_id) = req.extensions().get::<UserId>() {
        return format!("user:{}", user_id.0);
    }
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();
    format!("ip:{}", ip)
}

fn telemetry_headers(limit: u32, remaining: u32, reset_secs: u64) -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (HeaderName::from_static(LIMIT_HEADER), limit.into()),
        (HeaderName::from_static(REMAINING_HEADER), remaining.into()),
        (HeaderName::from_static(RESET_HEADER), reset_secs.into()),
    ]
}

fn apply_headers(map: &mut HeaderMap, headers: Vec<(HeaderName, HeaderValue)>) {
    for (name, value) in headers {
        map.insert(name, value);
    }
}

fn record(class: EndpointClass, decision: &str) {
    RATE_LIMIT_DECISIONS_TOTAL
        .with_label_values(&[class.as_str(), decision])
        .inc();
}
