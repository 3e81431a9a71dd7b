use actix_middleware::UserId;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::{gated, stored, ListQuery};
use crate::error::{AppError, Result};
use crate::models::{EventKind, HistoryEvent, Recipe};
use crate::services::ledger::{self, history_feed_window};
use crate::services::sequencer::Page;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub recipe_id: Uuid,
    pub saved: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HistoryRequest {
    pub kind: EventKind,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub event: HistoryEvent,
    /// An earlier view within the hour was returned instead of a new event
    pub collapsed: bool,
}

#[derive(Debug, Serialize)]
pub struct SavedItem {
    pub recipe_id: Uuid,
    pub saved_at: DateTime<Utc>,
    /// Absent when the recipe is no longer published
    pub recipe: Option<Recipe>,
}

async fn require_published(state: &AppState, id: Uuid) -> Result<Recipe> {
    state
        .corpus
        .find_published(id)
        .await
        .map_err(|e| e.unavailable("recipe corpus"))?
        .ok_or_else(|| AppError::NotFound(format!("recipe {}", id)))
}

/// GET /api/v1/recipes/{id}
pub async fn get_recipe(
    state: web::Data<AppState>,
    _user_id: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let recipe = require_published(&state, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(recipe))
}

/// PUT /api/v1/recipes/{id}/save
///
/// Flips membership and returns the post-toggle state.
pub async fn toggle_save(
    state: web::Data<AppState>,
    req: HttpRequest,
    user_id: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let recipe_id = path.into_inner();
    let op_state = state.get_ref().clone();

    let operation = async move {
        require_published(&op_state, recipe_id).await?;
        let membership =
            ledger::toggle_save(op_state.ledger.as_ref(), user_id.0, recipe_id, Utc::now())
                .await
                .map_err(|e| e.unavailable("interaction ledger"))?;
        info!(
            user_id = %user_id.0,
            recipe_id = %recipe_id,
            saved = membership.is_saved(),
            "Save toggled"
        );
        stored(
            StatusCode::OK,
            &MembershipResponse {
                recipe_id,
                saved: membership.is_saved(),
            },
        )
    };

    gated(
        &state,
        &req,
        &user_id.0.to_string(),
        &serde_json::Value::Null,
        operation,
    )
    .await
}

/// GET /api/v1/recipes/{id}/save
pub async fn get_membership(
    state: web::Data<AppState>,
    user_id: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let recipe_id = path.into_inner();
    let membership = state
        .ledger
        .membership(user_id.0, recipe_id)
        .await
        .map_err(|e| e.unavailable("interaction ledger"))?;
    Ok(HttpResponse::Ok().json(MembershipResponse {
        recipe_id,
        saved: membership.is_saved(),
    }))
}

/// POST /api/v1/recipes/{id}/history
///
/// 201 when a new event was appended, 200 when a view collapsed into an
/// earlier one within the hour.
pub async fn record_history(
    state: web::Data<AppState>,
    req: HttpRequest,
    user_id: UserId,
    path: web::Path<Uuid>,
    body: web::Json<HistoryRequest>,
) -> Result<HttpResponse> {
    let recipe_id = path.into_inner();
    let body = body.into_inner();
    let fingerprint_body = serde_json::to_value(&body)
        .map_err(|e| AppError::Internal(format!("request serialization failed: {}", e)))?;
    let op_state = state.get_ref().clone();

    let operation = async move {
        require_published(&op_state, recipe_id).await?;
        let recorded = op_state
            .ledger
            .record_event(user_id.0, recipe_id, body.kind, Utc::now())
            .await
            .map_err(|e| e.unavailable("interaction ledger"))?;

        let status = if recorded.collapsed {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
        stored(
            status,
            &HistoryResponse {
                event: recorded.event,
                collapsed: recorded.collapsed,
            },
        )
    };

    gated(
        &state,
        &req,
        &user_id.0.to_string(),
        &fingerprint_body,
        operation,
    )
    .await
}

/// GET /api/v1/me/saved
pub async fn list_saved(
    state: web::Data<AppState>,
    user_id: UserId,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = query.page()?;
    let (saved, total) = state
        .ledger
        .saved(user_id.0, page.limit, page.offset)
        .await
        .map_err(|e| e.unavailable("interaction ledger"))?;

    let ids: Vec<Uuid> = saved.iter().map(|s| s.recipe_id).collect();
    let mut recipes: HashMap<Uuid, Recipe> = state
        .corpus
        .find_many(&ids)
        .await
        .map_err(|e| e.unavailable("recipe corpus"))?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    let items: Vec<SavedItem> = saved
        .into_iter()
        .map(|s| SavedItem {
            recipe: recipes.remove(&s.recipe_id),
            recipe_id: s.recipe_id,
            saved_at: s.saved_at,
        })
        .collect();

    Ok(HttpResponse::Ok().json(Page {
        has_more: page.offset + items.len() < total,
        items,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// GET /api/v1/me/history
///
/// The last 180 days, newest first.
pub async fn list_history(
    state: web::Data<AppState>,
    user_id: UserId,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = query.page()?;
    let since = Utc::now() - history_feed_window();
    let (items, total) = state
        .ledger
        .history(user_id.0, since, page.limit, page.offset)
        .await
        .map_err(|e| e.unavailable("interaction ledger"))?;

    Ok(HttpResponse::Ok().json(Page {
        has_more: page.offset + items.len() < total,
        items,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}
