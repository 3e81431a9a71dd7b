use actix_middleware::{RequesterRoles, UserId};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{gated, stored};
use crate::error::{AppError, Result};
use crate::models::{Recipe, RecipeContent, UserRecipe};
use crate::services::ReviewDecision;
use crate::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub user_recipe: UserRecipe,
    pub published_recipe: Option<Recipe>,
}

/// What a link holder sees: the content, without owner or review details.
#[derive(Debug, Serialize)]
pub struct SharedRecipeView {
    pub id: Uuid,
    #[serde(flatten)]
    pub content: RecipeContent,
    pub total_minutes: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecipe> for SharedRecipeView {
    fn from(recipe: UserRecipe) -> Self {
        Self {
            id: recipe.id,
            total_minutes: recipe.content.total_minutes(),
            content: recipe.content,
            updated_at: recipe.updated_at,
        }
    }
}

fn body_value<T: Serialize>(body: &T) -> Result<serde_json::Value> {
    serde_json::to_value(body)
        .map_err(|e| AppError::Internal(format!("request serialization failed: {}", e)))
}

/// POST /api/v1/me/recipes
pub async fn create_user_recipe(
    state: web::Data<AppState>,
    req: HttpRequest,
    user_id: UserId,
    body: web::Json<RecipeContent>,
) -> Result<HttpResponse> {
    let content = body.into_inner();
    let fingerprint_body = body_value(&content)?;
    let curation = state.curation.clone();

    let operation = async move {
        let recipe = curation
            .create(user_id.0, content, Utc::now())
            .await
            .map_err(|e| e.unavailable("user recipe store"))?;
        stored(StatusCode::CREATED, &recipe)
    };

    gated(&state, &req, &user_id.0.to_string(), &fingerprint_body, operation).await
}

/// PATCH /api/v1/me/recipes/{id}
///
/// Replaces the content. Refused while the recipe awaits review.
pub async fn edit_user_recipe(
    state: web::Data<AppState>,
    req: HttpRequest,
    user_id: UserId,
    path: web::Path<Uuid>,
    body: web::Json<RecipeContent>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let content = body.into_inner();
    let fingerprint_body = body_value(&content)?;
    let curation = state.curation.clone();

    let operation = async move {
        let recipe = curation
            .edit(user_id.0, id, content, Utc::now())
            .await
            .map_err(|e| e.unavailable("user recipe store"))?;
        stored(StatusCode::OK, &recipe)
    };

    gated(&state, &req, &user_id.0.to_string(), &fingerprint_body, operation).await
}

/// POST /api/v1/me/recipes/{id}/submit
pub async fn submit_user_recipe(
    state: web::Data<AppState>,
    req: HttpRequest,
    user_id: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let curation = state.curation.clone();

    let operation = async move {
        let recipe = curation
            .submit(user_id.0, id, Utc::now())
            .await
            .map_err(|e| e.unavailable("user recipe store"))?;
        stored(StatusCode::OK, &recipe)
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

/// POST /api/v1/me/recipes/{id}/share
///
/// Issues a fresh link slug; earlier slugs stop resolving.
pub async fn share_user_recipe(
    state: web::Data<AppState>,
    req: HttpRequest,
    user_id: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let curation = state.curation.clone();

    let operation = async move {
        let recipe = curation
            .share(user_id.0, id, Utc::now())
            .await
            .map_err(|e| e.unavailable("user recipe store"))?;
        stored(StatusCode::OK, &recipe)
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

/// GET /api/v1/shared/{slug}
///
/// Anonymous readers are allowed.
pub async fn get_shared_recipe(
    state: web::Data<AppState>,
    user_id: Option<UserId>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let recipe = state
        .curation
        .shared(&slug)
        .await
        .map_err(|e| e.unavailable("user recipe store"))?;
    debug!(
        user_recipe_id = %recipe.id,
        anonymous = user_id.is_none(),
        "Shared recipe read"
    );
    Ok(HttpResponse::Ok().json(SharedRecipeView::from(recipe)))
}

/// POST /api/v1/curation/{id}/review
pub async fn review_user_recipe(
    state: web::Data<AppState>,
    req: HttpRequest,
    user_id: UserId,
    roles: RequesterRoles,
    path: web::Path<Uuid>,
    body: web::Json<ReviewRequest>,
) -> Result<HttpResponse> {
    if !roles.is_curator() {
        warn!(user_id = %user_id.0, "Review attempted without curator role");
        return Err(AppError::Forbidden(
            "Reviewing submissions requires the curator role".to_string(),
        ));
    }

    let id = path.into_inner();
    let body = body.into_inner();
    let fingerprint_body = body_value(&body)?;
    let curation = state.curation.clone();

    let operation = async move {
        let (user_recipe, published_recipe) = curation
            .review(user_id.0, id, body.decision, body.note, Utc::now())
            .await
            .map_err(|e| e.unavailable("user recipe store"))?;
        stored(
            StatusCode::OK,
            &ReviewResponse {
                user_recipe,
                published_recipe,
            },
        )
    };

    gated(&state, &req, &user_id.0.to_string(), &fingerprint_body, operation).await
}
