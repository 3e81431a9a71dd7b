//! User recipe lifecycle: authoring, sharing by link, submission and review.
//!
//! | Action  | Allowed when           | Visibility  | Curation   |
//! |---------|------------------------|-------------|------------|
//! | edit    | not pending review     | unchanged   | unchanged  |
//! | share   | not pending review     | `shared`    | unchanged  |
//! | submit  | not pending review     | `submitted` | `pending`  |
//! | approve | pending review         | unchanged   | `approved` |
//! | reject  | pending review         | `private`   | `rejected` |
//!
//! Submitting retires any share link.
//!
//! Approval copies the content into a published [`Recipe`]; later approvals
//! of the same user recipe revise that copy, bumping its version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{CurationState, Recipe, RecipeContent, RecipeStatus, UserRecipe, Visibility};
use crate::services::filter_compiler::{normalize_token, Taxonomy};

const SHARE_SLUG_LEN: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurationAction {
    Edit,
    Share,
    Submit,
    Approve,
    Reject,
}

impl CurationAction {
    fn as_str(&self) -> &'static str {
        match self {
            CurationAction::Edit => "edit",
            CurationAction::Share => "share",
            CurationAction::Submit => "submit",
            CurationAction::Approve => "approve",
            CurationAction::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Post-state of an allowed action.
pub fn transition(
    visibility: Visibility,
    curation: Option<CurationState>,
    action: CurationAction,
) -> Result<(Visibility, Option<CurationState>)> {
    let pending = curation == Some(CurationState::Pending);
    let next = match (action, pending) {
        (CurationAction::Edit, false) => Some((visibility, curation)),
        (CurationAction::Share, false) => Some((Visibility::Shared, curation)),
        (CurationAction::Submit, false) => {
            Some((Visibility::Submitted, Some(CurationState::Pending)))
        }
        (CurationAction::Approve, true) => Some((visibility, Some(CurationState::Approved))),
        (CurationAction::Reject, true) => {
            Some((Visibility::Private, Some(CurationState::Rejected)))
        }
        _ => None,
    };

    next.ok_or_else(|| {
        let state = curation.map(|c| c.as_str()).unwrap_or("none");
        AppError::InvalidTransition(format!(
            "cannot {} a recipe in {} visibility with curation state {}",
            action.as_str(),
            visibility.as_str(),
            state
        ))
    })
}

/// Build the published copy for an approved user recipe.
pub fn publish_copy(source: &UserRecipe, existing: Option<Recipe>, now: DateTime<Utc>) -> Recipe {
    match existing {
        Some(mut recipe) => {
            if recipe.status != RecipeStatus::Published {
                recipe.status = RecipeStatus::Published;
                recipe.updated_at = now;
            }
            recipe.revise(source.content.clone(), now);
            recipe
        }
        None => {
            let mut recipe = Recipe::new(source.content.clone(), RecipeStatus::Published, now);
            recipe.source_user_recipe_id = Some(source.id);
            recipe
        }
    }
}

/// URL-safe random slug. Each share rotates it.
pub fn new_share_slug() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHARE_SLUG_LEN)
        .map(char::from)
        .collect()
}

/// Durable storage for user recipes.
///
/// Updates are optimistic: a write succeeds only if the stored `revision`
/// still equals `expected_revision`.
#[async_trait]
pub trait UserRecipeRepository: Send + Sync {
    async fn insert(&self, recipe: &UserRecipe) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<UserRecipe>>;

    /// A user recipe currently shared under `slug`.
    async fn find_shared(&self, slug: &str) -> Result<Option<UserRecipe>>;

    async fn update(&self, recipe: &UserRecipe, expected_revision: i32) -> Result<bool>;

    /// A catalogue recipe by id, whatever its status.
    async fn find_recipe(&self, id: Uuid) -> Result<Option<Recipe>>;

    /// Store the review and upsert the published copy in one transaction.
    async fn approve(
        &self,
        recipe: &UserRecipe,
        expected_revision: i32,
        published: &Recipe,
    ) -> Result<bool>;
}

pub struct CurationService {
    repo: Arc<dyn UserRecipeRepository>,
    taxonomy: Arc<Taxonomy>,
}

impl CurationService {
    pub fn new(repo: Arc<dyn UserRecipeRepository>, taxonomy: Arc<Taxonomy>) -> Self {
        Self { repo, taxonomy }
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        content: RecipeContent,
        now: DateTime<Utc>,
    ) -> Result<UserRecipe> {
        let content = self.validated(content)?;
        let recipe = UserRecipe::new(owner_id, content, now);
        self.repo.insert(&recipe).await?;
        info!(user_id = %owner_id, user_recipe_id = %recipe.id, "User recipe created");
        Ok(recipe)
    }

    pub async fn edit(
        &self,
        owner_id: Uuid,
        id: Uuid,
        content: RecipeContent,
        now: DateTime<Utc>,
    ) -> Result<UserRecipe> {
        let content = self.validated(content)?;
        let mut recipe = self.owned(owner_id, id).await?;
        transition(recipe.visibility, recipe.curation, CurationAction::Edit)?;
        recipe.content = content;
        self.save(recipe, now).await
    }

    pub async fn share(&self, owner_id: Uuid, id: Uuid, now: DateTime<Utc>) -> Result<UserRecipe> {
        let mut recipe = self.owned(owner_id, id).await?;
        let (visibility, curation) =
            transition(recipe.visibility, recipe.curation, CurationAction::Share)?;
        recipe.visibility = visibility;
        recipe.curation = curation;
        recipe.share_slug = Some(new_share_slug());
        self.save(recipe, now).await
    }

    pub async fn submit(&self, owner_id: Uuid, id: Uuid, now: DateTime<Utc>) -> Result<UserRecipe> {
        let mut recipe = self.owned(owner_id, id).await?;
        let (visibility, curation) =
            transition(recipe.visibility, recipe.curation, CurationAction::Submit)?;
        recipe.visibility = visibility;
        recipe.curation = curation;
        recipe.share_slug = None;
        recipe.reviewer_id = None;
        recipe.review_note = None;
        recipe.reviewed_at = None;
        let recipe = self.save(recipe, now).await?;
        info!(user_recipe_id = %recipe.id, "User recipe submitted for review");
        Ok(recipe)
    }

    /// Approve or reject a pending submission. Returns the published copy on approval.
    pub async fn review(
        &self,
        reviewer_id: Uuid,
        id: Uuid,
        decision: ReviewDecision,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(UserRecipe, Option<Recipe>)> {
        let mut recipe = self
            .repo
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user recipe {}", id)))?;

        let action = match decision {
            ReviewDecision::Approve => CurationAction::Approve,
            ReviewDecision::Reject => CurationAction::Reject,
        };
        let (visibility, curation) = transition(recipe.visibility, recipe.curation, action)?;

        let expected = recipe.revision;
        recipe.visibility = visibility;
        recipe.curation = curation;
        recipe.reviewer_id = Some(reviewer_id);
        recipe.review_note = note;
        recipe.reviewed_at = Some(now);
        recipe.revision += 1;
        recipe.updated_at = now;

        let published = match decision {
            ReviewDecision::Reject => {
                if !self.repo.update(&recipe, expected).await? {
                    return Err(concurrent_modification());
                }
                None
            }
            ReviewDecision::Approve => {
                let existing = match recipe.published_recipe_id {
                    Some(published_id) => self.repo.find_recipe(published_id).await?,
                    None => None,
                };
                let copy = publish_copy(&recipe, existing, now);
                recipe.published_recipe_id = Some(copy.id);
                if !self.repo.approve(&recipe, expected, &copy).await? {
                    return Err(concurrent_modification());
                }
                Some(copy)
            }
        };

        info!(
            user_recipe_id = %recipe.id,
            reviewer_id = %reviewer_id,
            decision = ?decision,
            "User recipe reviewed"
        );
        Ok((recipe, published))
    }

    /// Read a recipe shared by link. Any slug that does not resolve is a 404.
    pub async fn shared(&self, slug: &str) -> Result<UserRecipe> {
        self.repo
            .find_shared(slug)
            .await?
            .ok_or_else(|| AppError::NotFound("shared recipe".to_string()))
    }

    /// Read one of the caller's own recipes.
    pub async fn owned(&self, owner_id: Uuid, id: Uuid) -> Result<UserRecipe> {
        match self.repo.find(id).await? {
            Some(recipe) if recipe.is_owned_by(owner_id) => Ok(recipe),
            // Other users' recipes are indistinguishable from missing ones.
            _ => Err(AppError::NotFound(format!("user recipe {}", id))),
        }
    }

    async fn save(&self, mut recipe: UserRecipe, now: DateTime<Utc>) -> Result<UserRecipe> {
        let expected = recipe.revision;
        recipe.revision += 1;
        recipe.updated_at = now;
        if self.repo.update(&recipe, expected).await? {
            Ok(recipe)
        } else {
            Err(concurrent_modification())
        }
    }

    /// Field validation plus taxonomy checks; tags come back normalized.
    fn validated(&self, mut content: RecipeContent) -> Result<RecipeContent> {
        let mut violations = match content.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => match AppError::from(errors) {
                AppError::Validation(v) => v,
                other => return Err(other),
            },
        };
        violations.extend(self.taxonomy.check_tags(
            &content.diet_tags,
            &content.allergens,
            &content.cuisines,
        ));
        if !violations.is_empty() {
            return Err(AppError::Validation(violations));
        }

        for tags in [
            &mut content.diet_tags,
            &mut content.allergens,
            &mut content.cuisines,
            &mut content.flag_tags,
        ] {
            let mut normalized: Vec<String> = tags.iter().map(|t| normalize_token(t)).collect();
            normalized.sort();
            normalized.dedup();
            *tags = normalized;
        }
        Ok(content)
    }
}

fn concurrent_modification() -> AppError {
    AppError::Conflict("the recipe was modified concurrently; reload and retry".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recipe::fixtures::content;

    #[test]
    fn test_submit_from_private_goes_pending() {
        let next = transition(Visibility::Private, None, CurationAction::Submit).unwrap();
        assert_eq!(next, (Visibility::Submitted, Some(CurationState::Pending)));
    }

    #[test]
    fn test_pending_blocks_owner_actions() {
        for action in [CurationAction::Edit, CurationAction::Share, CurationAction::Submit] {
            let err = transition(Visibility::Submitted, Some(CurationState::Pending), action)
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition(_)));
        }
    }

    #[test]
    fn test_review_requires_pending() {
        assert!(transition(Visibility::Private, None, CurationAction::Approve).is_err());
        assert!(transition(
            Visibility::Submitted,
            Some(CurationState::Approved),
            CurationAction::Reject
        )
        .is_err());

        let rejected = transition(
            Visibility::Submitted,
            Some(CurationState::Pending),
            CurationAction::Reject,
        )
        .unwrap();
        assert_eq!(rejected, (Visibility::Private, Some(CurationState::Rejected)));
    }

    #[test]
    fn test_rejected_can_be_resubmitted() {
        let next = transition(
            Visibility::Private,
            Some(CurationState::Rejected),
            CurationAction::Submit,
        )
        .unwrap();
        assert_eq!(next.1, Some(CurationState::Pending));
    }

    #[test]
    fn test_publish_copy_is_linked_copy() {
        let now = Utc::now();
        let source = UserRecipe::new(Uuid::new_v4(), content("Shakshuka"), now);
        let copy = publish_copy(&source, None, now);

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.source_user_recipe_id, Some(source.id));
        assert_eq!(copy.status, RecipeStatus::Published);
        assert_eq!(copy.content, source.content);
    }

    #[test]
    fn test_republish_bumps_version() {
        let now = Utc::now();
        let mut source = UserRecipe::new(Uuid::new_v4(), content("Shakshuka"), now);
        let first = publish_copy(&source, None, now);

        source.content.nutrition.calories = 520.0;
        let second = publish_copy(&source, Some(first.clone()), now);

        assert_eq!(second.id, first.id);
        assert_eq!(second.version, 2);
        assert_eq!(second.content.nutrition.calories, 520.0);
    }

    #[test]
    fn test_share_slugs_rotate() {
        let a = new_share_slug();
        let b = new_share_slug();
        assert_eq!(a.len(), SHARE_SLUG_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
