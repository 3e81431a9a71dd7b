/// Database access layer
///
/// - Connection pool creation
/// - PostgreSQL implementations of the corpus, ledger, user recipe and
///   popularity contracts
/// - Row mapping shared by `recipes` and `user_recipes`, which carry the
///   same content columns
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::models::{Nutrition, RecipeContent};

pub mod interaction_repo;
pub mod popularity_repo;
pub mod recipe_repo;
pub mod user_recipe_repo;

pub use interaction_repo::PgInteractionLedger;
pub use popularity_repo::PgPopularitySource;
pub use recipe_repo::PgRecipeCorpus;
pub use user_recipe_repo::PgUserRecipeRepository;

/// Recipe tables plus the idempotency record table the gate writes to.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Content columns, in the order [`bind_content`] binds them.
pub(crate) const CONTENT_COLUMNS: &str = "title, description, ingredients, prep_minutes, \
     cook_minutes, calories, protein_g, sugar_g, sodium_mg, fiber_g, saturated_fat_g, \
     cuisines, diet_tags, flag_tags, allergens";

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(
        max_connections = config.max_connections,
        "Database pool created and verified"
    );
    Ok(pool)
}

pub(crate) fn bind_content<'q>(
    query: Query<'q, Postgres, PgArguments>,
    content: &'q RecipeContent,
) -> Query<'q, Postgres, PgArguments> {
    let n = &content.nutrition;
    query
        .bind(&content.title)
        .bind(&content.description)
        .bind(&content.ingredients)
        .bind(content.prep_minutes)
        .bind(content.cook_minutes)
        .bind(n.calories)
        .bind(n.protein_g)
        .bind(n.sugar_g)
        .bind(n.sodium_mg)
        .bind(n.fiber_g)
        .bind(n.saturated_fat_g)
        .bind(&content.cuisines)
        .bind(&content.diet_tags)
        .bind(&content.flag_tags)
        .bind(&content.allergens)
}

pub(crate) fn content_from_row(row: &PgRow) -> Result<RecipeContent, sqlx::Error> {
    Ok(RecipeContent {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        ingredients: row.try_get("ingredients")?,
        prep_minutes: row.try_get("prep_minutes")?,
        cook_minutes: row.try_get("cook_minutes")?,
        nutrition: Nutrition {
            calories: row.try_get("calories")?,
            protein_g: row.try_get("protein_g")?,
            sugar_g: row.try_get("sugar_g")?,
            sodium_mg: row.try_get("sodium_mg")?,
            fiber_g: row.try_get("fiber_g")?,
            saturated_fat_g: row.try_get("saturated_fat_g")?,
        },
        cuisines: row.try_get("cuisines")?,
        diet_tags: row.try_get("diet_tags")?,
        flag_tags: row.try_get("flag_tags")?,
        allergens: row.try_get("allergens")?,
    })
}

/// Parse a text enum column, surfacing bad values as decode errors.
pub(crate) fn decode_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}
