/// HTTP handlers for recipe-service
///
/// - `search`: ranked recipe search
/// - `interactions`: recipe reads, save toggle, history, saved list
/// - `user_recipes`: authoring, sharing, submission and review
///
/// Mutating handlers go through [`gated`], which applies the idempotency
/// gate keyed by the `Idempotency-Key` header.
use actix_web::http::{header, StatusCode};
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use error_types::{error_codes, PROBLEM_CONTENT_TYPE};
use idempotency_gate::{Fingerprint, GateError, IdempotencyError, StoredResponse};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::{AppError, Result};
use crate::metrics::IDEMPOTENCY_OUTCOMES_TOTAL;
use crate::services::sequencer::PageRequest;
use crate::AppState;

pub mod interactions;
pub mod search;
pub mod user_recipes;

pub use interactions::{
    get_membership, get_recipe, list_history, list_saved, record_history, toggle_save,
};
pub use search::search_recipes;
pub use user_recipes::{
    create_user_recipe, edit_user_recipe, get_shared_recipe, review_user_recipe,
    share_user_recipe, submit_user_recipe,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "Idempotency-Replayed";

/// Serialize a handler result for the gate.
pub(crate) fn stored<T: Serialize>(status: StatusCode, body: &T) -> Result<StoredResponse> {
    let body = serde_json::to_value(body)
        .map_err(|e| AppError::Internal(format!("response serialization failed: {}", e)))?;
    Ok(StoredResponse::new(status.as_u16(), body))
}

/// Run a mutation through the idempotency gate.
///
/// The fingerprint covers method, path and the canonical JSON body. Client
/// errors produced by the operation are captured as responses so retries
/// replay them; server-side failures release the key.
pub(crate) async fn gated<Fut>(
    state: &AppState,
    req: &HttpRequest,
    requester: &str,
    body: &serde_json::Value,
    operation: Fut,
) -> Result<HttpResponse>
where
    Fut: Future<Output = Result<StoredResponse>> + Send + 'static,
{
    let key = match req.headers().get(IDEMPOTENCY_KEY_HEADER) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| {
            AppError::validation(
                IDEMPOTENCY_KEY_HEADER,
                error_codes::INVALID_FORMAT,
                "Idempotency key must contain visible ASCII characters only",
            )
        })?),
    };

    let fingerprint = Fingerprint::of_request(req.method().as_str(), req.path(), body);

    let operation = async move {
        match operation.await {
            Ok(response) => Ok(response),
            Err(err) if err.is_client_error() => Ok(StoredResponse::new(
                err.status_code().as_u16(),
                err.problem().to_json(),
            )),
            Err(err) => Err(err),
        }
    };

    let result = state
        .gate
        .execute(key, requester, &fingerprint, operation)
        .await;

    let label = match (&result, key) {
        (Ok(_), None) => "passthrough",
        (Ok(outcome), Some(_)) if outcome.is_replay() => "replayed",
        (Ok(_), Some(_)) => "executed",
        (Err(GateError::Idempotency(IdempotencyError::KeyReused)), _) => "conflict",
        (Err(GateError::Idempotency(IdempotencyError::InProgress)), _) => "in_progress",
        (Err(GateError::Idempotency(e)), _) if e.is_store_failure() => "unavailable",
        (Err(_), _) => "error",
    };
    IDEMPOTENCY_OUTCOMES_TOTAL.with_label_values(&[label]).inc();

    let outcome = result.map_err(AppError::from)?;
    let replayed = outcome.is_replay();
    Ok(render(outcome.into_response(), replayed))
}

fn render(response: StoredResponse, replayed: bool) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let mut builder = HttpResponse::build(status);
    if status.is_client_error() || status.is_server_error() {
        builder.insert_header((header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE));
    } else {
        builder.insert_header((header::CONTENT_TYPE, "application/json"));
    }
    if replayed {
        builder.insert_header((IDEMPOTENCY_REPLAYED_HEADER, "true"));
    }
    builder.body(response.body.to_string())
}

/// `limit` / `offset` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn page(&self) -> Result<PageRequest> {
        let mut violations = Vec::new();
        if let Some(limit) = self.limit.filter(|l| *l < 1) {
            violations.push(error_types::FieldViolation::new(
                "limit",
                error_codes::OUT_OF_RANGE,
                format!("must be >= 1, got {}", limit),
            ));
        }
        if let Some(offset) = self.offset.filter(|o| *o < 0) {
            violations.push(error_types::FieldViolation::new(
                "offset",
                error_codes::OUT_OF_RANGE,
                format!("must be >= 0, got {}", offset),
            ));
        }
        if !violations.is_empty() {
            return Err(AppError::Validation(violations));
        }
        Ok(PageRequest::new(self.limit, self.offset.unwrap_or(0)))
    }
}
