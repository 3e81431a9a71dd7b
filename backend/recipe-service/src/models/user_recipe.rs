use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::recipe::RecipeContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Shared,
    Submitted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Shared => "shared",
            Visibility::Submitted => "submitted",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "shared" => Ok(Visibility::Shared),
            "submitted" => Ok(Visibility::Submitted),
            other => Err(format!("unknown visibility '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationState {
    Pending,
    Approved,
    Rejected,
}

impl CurationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurationState::Pending => "pending",
            CurationState::Approved => "approved",
            CurationState::Rejected => "rejected",
        }
    }
}

impl FromStr for CurationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CurationState::Pending),
            "approved" => Ok(CurationState::Approved),
            "rejected" => Ok(CurationState::Rejected),
            other => Err(format!("unknown curation state '{}'", other)),
        }
    }
}

/// A recipe owned by exactly one user.
///
/// Approval copies the content into a published `Recipe`; the two stay
/// linked through `published_recipe_id` / `source_user_recipe_id` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecipe {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(flatten)]
    pub content: RecipeContent,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_slug: Option<String>,
    pub curation: Option<CurationState>,
    pub reviewer_id: Option<Uuid>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub published_recipe_id: Option<Uuid>,
    /// Row version for optimistic updates
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecipe {
    pub fn new(owner_id: Uuid, content: RecipeContent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            content,
            visibility: Visibility::Private,
            share_slug: None,
            curation: None,
            reviewer_id: None,
            review_note: None,
            reviewed_at: None,
            published_recipe_id: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }
}
