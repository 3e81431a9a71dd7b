use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Per-serving nutrition facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Nutrition {
    #[validate(range(min = 0.0, max = 10000.0))]
    pub calories: f64,
    #[validate(range(min = 0.0, max = 1000.0))]
    pub protein_g: f64,
    #[validate(range(min = 0.0, max = 1000.0))]
    pub sugar_g: f64,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub sodium_mg: f64,
    #[validate(range(min = 0.0, max = 1000.0))]
    pub fiber_g: f64,
    #[validate(range(min = 0.0, max = 1000.0))]
    pub saturated_fat_g: Option<f64>,
}

/// Everything a cook sees; shared by catalogue and user-authored recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RecipeContent {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 4000))]
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 100))]
    pub ingredients: Vec<String>,
    #[validate(range(min = 0, max = 1440))]
    pub prep_minutes: i32,
    #[validate(range(min = 0, max = 1440))]
    pub cook_minutes: i32,
    #[validate(nested)]
    pub nutrition: Nutrition,
    #[validate(length(max = 10))]
    #[serde(default)]
    pub cuisines: Vec<String>,
    #[validate(length(max = 20))]
    #[serde(default)]
    pub diet_tags: Vec<String>,
    #[validate(length(max = 20))]
    #[serde(default)]
    pub flag_tags: Vec<String>,
    #[validate(length(max = 20))]
    #[serde(default)]
    pub allergens: Vec<String>,
}

impl RecipeContent {
    pub fn total_minutes(&self) -> i32 {
        self.prep_minutes + self.cook_minutes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeStatus {
    Draft,
    Private,
    Submitted,
    Published,
    Hidden,
    Rejected,
}

impl RecipeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeStatus::Draft => "draft",
            RecipeStatus::Private => "private",
            RecipeStatus::Submitted => "submitted",
            RecipeStatus::Published => "published",
            RecipeStatus::Hidden => "hidden",
            RecipeStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RecipeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RecipeStatus::Draft),
            "private" => Ok(RecipeStatus::Private),
            "submitted" => Ok(RecipeStatus::Submitted),
            "published" => Ok(RecipeStatus::Published),
            "hidden" => Ok(RecipeStatus::Hidden),
            "rejected" => Ok(RecipeStatus::Rejected),
            other => Err(format!("unknown recipe status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    #[serde(flatten)]
    pub content: RecipeContent,
    pub status: RecipeStatus,
    pub version: i32,
    pub source_user_recipe_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    pub fn new(content: RecipeContent, status: RecipeStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            status,
            version: 1,
            source_user_recipe_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == RecipeStatus::Published
    }

    pub fn total_minutes(&self) -> i32 {
        self.content.total_minutes()
    }

    /// Replace the content. Returns `false` when nothing changed.
    ///
    /// A published recipe's nutrition and allergens are only ever changed
    /// together with a version bump, so every effective change to a published
    /// recipe bumps `version`.
    pub fn revise(&mut self, content: RecipeContent, now: DateTime<Utc>) -> bool {
        if self.content == content {
            return false;
        }
        self.content = content;
        self.updated_at = now;
        if self.is_published() {
            self.version += 1;
        }
        true
    }

    pub fn has_diet(&self, diet: &str) -> bool {
        self.content.diet_tags.iter().any(|d| d == diet)
    }

    pub fn has_cuisine(&self, cuisine: &str) -> bool {
        self.content.cuisines.iter().any(|c| c == cuisine)
    }

    pub fn has_allergen(&self, allergen: &str) -> bool {
        self.content.allergens.iter().any(|a| a == allergen)
    }
}
