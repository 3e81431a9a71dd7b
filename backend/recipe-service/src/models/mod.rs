/// Data models for recipe-service
///
/// - `Recipe`: published (or otherwise curated) catalogue recipes
/// - `UserRecipe`: recipes authored by one user, with sharing and curation state
/// - `SavedRecipe` / `HistoryEvent`: the interaction ledger's records
pub mod interaction;
pub mod recipe;
pub mod user_recipe;

pub use interaction::{EventKind, HistoryEvent, Membership, SavedRecipe};
pub use recipe::{Nutrition, Recipe, RecipeContent, RecipeStatus};
pub use user_recipe::{CurationState, UserRecipe, Visibility};
