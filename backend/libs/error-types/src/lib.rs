//! Shared error body for Nova HTTP services.
//!
//! Every externally visible failure is rendered as an RFC 7807 style
//! problem document (`application/problem+json`) so that clients can rely
//! on one shape regardless of which layer rejected the request: the rate
//! limiter, the idempotency gate, or a handler.
//!
//! Validation failures additionally carry an `errors` list with one entry
//! per offending field.

use serde::{Deserialize, Serialize};

/// Content type for problem documents.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Canonical problem `type` URIs.
pub mod error_types {
    pub const VALIDATION: &str = "https://errors.nova.dev/validation";
    pub const NOT_FOUND: &str = "https://errors.nova.dev/not-found";
    pub const UNAUTHORIZED: &str = "https://errors.nova.dev/unauthorized";
    pub const FORBIDDEN: &str = "https://errors.nova.dev/forbidden";
    pub const CONFLICT: &str = "https://errors.nova.dev/conflict";
    pub const IDEMPOTENCY_KEY_REUSED: &str = "https://errors.nova.dev/idempotency-key-reused";
    pub const REQUEST_IN_PROGRESS: &str = "https://errors.nova.dev/request-in-progress";
    pub const INVALID_TRANSITION: &str = "https://errors.nova.dev/invalid-transition";
    pub const SEARCH_TOO_BROAD: &str = "https://errors.nova.dev/search-too-broad";
    pub const RATE_LIMITED: &str = "https://errors.nova.dev/rate-limited";
    pub const DEPENDENCY_UNAVAILABLE: &str = "https://errors.nova.dev/dependency-unavailable";
    pub const INTERNAL: &str = "https://errors.nova.dev/internal";
}

/// Machine-readable codes attached to field violations.
pub mod error_codes {
    pub const REQUIRED: &str = "required";
    pub const INVALID_NUMBER: &str = "invalid_number";
    pub const OUT_OF_RANGE: &str = "out_of_range";
    pub const CONTRADICTORY_BOUNDS: &str = "contradictory_bounds";
    pub const UNKNOWN_TOKEN: &str = "unknown_token";
    pub const INVALID_FORMAT: &str = "invalid_format";
    pub const TOO_LONG: &str = "too_long";
}

/// One problem with one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Problem details body (`type/title/status/detail/instance`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldViolation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ProblemDetails {
    pub fn new(problem_type: &str, title: &str, status: u16) -> Self {
        Self {
            problem_type: problem_type.to_string(),
            title: title.to_string(),
            status,
            detail: None,
            instance: None,
            errors: Vec::new(),
            retry_after_secs: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<FieldViolation>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Generic 500 that never carries internal detail.
    pub fn internal() -> Self {
        Self::new(error_types::INTERNAL, "Internal Server Error", 500)
            .with_detail("An unexpected error occurred")
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(error_types::RATE_LIMITED, "Too Many Requests", 429)
            .with_detail(format!(
                "Rate limit exceeded, retry in {} seconds",
                retry_after_secs
            ))
            .with_retry_after(retry_after_secs)
    }

    pub fn dependency_unavailable(dependency: &str, retry_after_secs: u64) -> Self {
        Self::new(
            error_types::DEPENDENCY_UNAVAILABLE,
            "Service Unavailable",
            503,
        )
        .with_detail(format!("{} is temporarily unavailable", dependency))
        .with_retry_after(retry_after_secs)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(error_types::UNAUTHORIZED, "Unauthorized", 401).with_detail(detail)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "type": self.problem_type,
                "title": self.title,
                "status": self.status,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_serializes_type_field() {
        let problem = ProblemDetails::new(error_types::CONFLICT, "Conflict", 409)
            .with_detail("key reused")
            .with_instance("/api/v1/recipes/1/save");

        let json = problem.to_json();
        assert_eq!(json["type"], error_types::CONFLICT);
        assert_eq!(json["status"], 409);
        assert_eq!(json["instance"], "/api/v1/recipes/1/save");
        assert!(json.get("errors").is_none());
        assert!(json.get("retry_after_secs").is_none());
    }

    #[test]
    fn test_validation_problem_lists_every_violation() {
        let problem = ProblemDetails::new(error_types::VALIDATION, "Invalid search query", 400)
            .with_errors(vec![
                FieldViolation::new("protein_min", error_codes::OUT_OF_RANGE, "must be >= 0"),
                FieldViolation::new("diet", error_codes::UNKNOWN_TOKEN, "unknown diet 'x'"),
            ]);

        let json = problem.to_json();
        assert_eq!(json["errors"].as_array().map(|a| a.len()), Some(2));
        assert_eq!(json["errors"][1]["field"], "diet");
    }

    #[test]
    fn test_internal_problem_hides_detail() {
        let problem = ProblemDetails::internal();
        assert_eq!(problem.status, 500);
        assert_eq!(problem.detail.as_deref(), Some("An unexpected error occurred"));
    }
}
