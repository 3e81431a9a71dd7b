/// Error types for Recipe Service
///
/// Every error leaves the service as an `application/problem+json` body.
/// Database and internal faults are logged in full and rendered as a generic
/// 500 that never carries the underlying message.
use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError, ResponseError},
    http::{header, StatusCode},
    HttpRequest, HttpResponse,
};
use error_types::{error_codes, error_types as problem_types, FieldViolation, ProblemDetails};
use idempotency_gate::{GateError, IdempotencyError};
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Result type for recipe-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Retry hint for 503 and in-progress responses.
const RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, Error)]
pub enum AppError {
    /// One or more request fields are invalid; all of them are listed
    #[error("Validation failed with {} problem(s)", .0.len())]
    Validation(Vec<FieldViolation>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Concurrent modification or duplicate resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Idempotency key reused for a different request
    #[error("Idempotency key was already used for a different request")]
    IdempotencyKeyReused,

    /// A request with the same idempotency key is still running
    #[error("A request with this idempotency key is still in progress")]
    RequestInProgress,

    /// State machine refused the requested change
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// More recipes match than the ranker considers; the client must narrow
    /// the search instead of receiving a ranking of a subset
    #[error("Search matched {matched} recipes, more than the {limit} that can be ranked")]
    SearchTooBroad { matched: u64, limit: usize },

    /// A collaborator (corpus, ledger, idempotency store) cannot be reached
    #[error("{dependency} unavailable")]
    DependencyUnavailable { dependency: &'static str },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, code: &str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldViolation::new(field, code, message)])
    }

    /// Re-label a storage failure as an unavailable dependency.
    pub fn unavailable(self, dependency: &'static str) -> Self {
        match self {
            AppError::Database(err) => {
                tracing::error!(dependency, error = %err, "Dependency call failed");
                AppError::DependencyUnavailable { dependency }
            }
            other => other,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn problem(&self) -> ProblemDetails {
        let status = self.status_code().as_u16();
        match self {
            AppError::Validation(errors) => {
                ProblemDetails::new(problem_types::VALIDATION, "Invalid request", status)
                    .with_detail(format!("{} field(s) failed validation", errors.len()))
                    .with_errors(errors.clone())
            }
            AppError::NotFound(msg) => {
                ProblemDetails::new(problem_types::NOT_FOUND, "Not Found", status).with_detail(msg)
            }
            AppError::Unauthorized(msg) => ProblemDetails::unauthorized(msg.clone()),
            AppError::Forbidden(msg) => {
                ProblemDetails::new(problem_types::FORBIDDEN, "Forbidden", status).with_detail(msg)
            }
            AppError::Conflict(msg) => {
                ProblemDetails::new(problem_types::CONFLICT, "Conflict", status).with_detail(msg)
            }
            AppError::IdempotencyKeyReused => ProblemDetails::new(
                problem_types::IDEMPOTENCY_KEY_REUSED,
                "Idempotency key reused",
                status,
            )
            .with_detail("This Idempotency-Key was used for a different request; pick a new key"),
            AppError::RequestInProgress => ProblemDetails::new(
                problem_types::REQUEST_IN_PROGRESS,
                "Request in progress",
                status,
            )
            .with_detail("A request with this Idempotency-Key is still being processed")
            .with_retry_after(RETRY_AFTER_SECS),
            AppError::InvalidTransition(msg) => {
                ProblemDetails::new(problem_types::INVALID_TRANSITION, "Invalid transition", status)
                    .with_detail(msg)
            }
            AppError::SearchTooBroad { matched, limit } => {
                ProblemDetails::new(problem_types::SEARCH_TOO_BROAD, "Search too broad", status)
                    .with_detail(format!(
                        "{} recipes match, more than the {} that can be ranked; \
                         add filters or query text",
                        matched, limit
                    ))
            }
            AppError::DependencyUnavailable { dependency } => {
                ProblemDetails::dependency_unavailable(dependency, RETRY_AFTER_SECS)
            }
            AppError::Database(_) | AppError::Internal(_) => ProblemDetails::internal(),
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RequestInProgress | AppError::DependencyUnavailable { .. } => {
                Some(RETRY_AFTER_SECS)
            }
            _ => None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_)
            | AppError::IdempotencyKeyReused
            | AppError::RequestInProgress
            | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::SearchTooBroad { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Database(_) | AppError::Internal(_) = self {
            tracing::error!(error = %self, "Request failed with internal error");
        }

        let mut builder = HttpResponse::build(self.status_code());
        builder.insert_header((header::CONTENT_TYPE, error_types::PROBLEM_CONTENT_TYPE));
        if let Some(secs) = self.retry_after() {
            builder.insert_header((header::RETRY_AFTER, secs.to_string()));
        }
        builder.body(self.problem().to_json().to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut violations = Vec::new();
        flatten_validation("", &errors, &mut violations);
        violations.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
        AppError::Validation(violations)
    }
}

fn flatten_validation(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for err in errs {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid ({})", path, err.code));
                    out.push(FieldViolation::new(path.clone(), err.code.to_string(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_validation(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

impl From<GateError<AppError>> for AppError {
    fn from(err: GateError<AppError>) -> Self {
        match err {
            GateError::Operation(err) => err,
            GateError::Idempotency(IdempotencyError::InvalidKey(msg)) => {
                AppError::validation("Idempotency-Key", error_codes::INVALID_FORMAT, msg)
            }
            GateError::Idempotency(IdempotencyError::KeyReused) => AppError::IdempotencyKeyReused,
            GateError::Idempotency(IdempotencyError::InProgress) => AppError::RequestInProgress,
            GateError::Idempotency(err) if err.is_store_failure() => {
                tracing::error!(error = %err, "Idempotency store failure, rejecting request");
                AppError::DependencyUnavailable {
                    dependency: "idempotency store",
                }
            }
            GateError::Idempotency(err) => AppError::Internal(err.to_string()),
        }
    }
}

/// Route malformed JSON bodies through the problem-details shape.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation("body", error_codes::INVALID_FORMAT, err.to_string()).into()
}

/// Route malformed query strings through the problem-details shape.
pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation("query", error_codes::INVALID_FORMAT, err.to_string()).into()
}

/// Unparsable path segments (e.g. a malformed id) name no resource.
pub fn path_error_handler(err: PathError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(path = %req.path(), error = %err, "Unparsable path parameter");
    AppError::NotFound(format!("no resource at {}", req.path())).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = AppError::Internal("connection string postgres://secret".into());
        let problem = err.problem();
        assert_eq!(problem.status, 500);
        assert!(!problem.to_json().to_string().contains("secret"));
    }

    #[test]
    fn test_validation_lists_every_field() {
        let err = AppError::Validation(vec![
            FieldViolation::new("protein_min", error_codes::OUT_OF_RANGE, "must be >= 0"),
            FieldViolation::new("diet", error_codes::UNKNOWN_TOKEN, "unknown diet 'carnivore'"),
        ]);
        let problem = err.problem();
        assert_eq!(problem.status, 400);
        assert_eq!(problem.errors.len(), 2);
    }

    #[test]
    fn test_gate_errors_map_to_problems() {
        let err: AppError = GateError::<AppError>::Idempotency(IdempotencyError::KeyReused).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: AppError =
            GateError::<AppError>::Idempotency(IdempotencyError::StoreUnavailable("down".into()))
                .into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.retry_after(), Some(RETRY_AFTER_SECS));

        let err: AppError =
            GateError::<AppError>::Idempotency(IdempotencyError::InvalidKey("empty".into())).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_search_too_broad_is_a_client_error() {
        let err = AppError::SearchTooBroad {
            matched: 12_000,
            limit: 10_000,
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let problem = err.problem();
        assert_eq!(problem.problem_type, problem_types::SEARCH_TOO_BROAD);
        assert!(problem.detail.unwrap_or_default().contains("12000"));
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_database_error_becomes_unavailable() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut).unavailable("recipe corpus");
        assert!(matches!(
            err,
            AppError::DependencyUnavailable {
                dependency: "recipe corpus"
            }
        ));
    }
}
