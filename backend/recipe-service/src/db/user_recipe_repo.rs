use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::recipe_repo::{recipe_from_row, recipe_select};
use super::{bind_content, content_from_row, decode_enum, CONTENT_COLUMNS};
use crate::error::Result;
use crate::models::{CurationState, Recipe, UserRecipe};
use crate::services::curation::UserRecipeRepository;

#[derive(Clone)]
pub struct PgUserRecipeRepository {
    pool: PgPool,
}

impl PgUserRecipeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_recipe_select() -> String {
    format!(
        "SELECT id, owner_id, {}, visibility, share_slug, curation, reviewer_id, review_note, \
         reviewed_at, published_recipe_id, revision, created_at, updated_at FROM user_recipes",
        CONTENT_COLUMNS
    )
}

fn user_recipe_from_row(row: &PgRow) -> std::result::Result<UserRecipe, sqlx::Error> {
    let curation: Option<String> = row.try_get("curation")?;
    let curation = curation
        .map(|c| c.parse::<CurationState>())
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "curation".to_string(),
            source: e.into(),
        })?;

    Ok(UserRecipe {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        content: content_from_row(row)?,
        visibility: decode_enum(row, "visibility")?,
        share_slug: row.try_get("share_slug")?,
        curation,
        reviewer_id: row.try_get("reviewer_id")?,
        review_note: row.try_get("review_note")?,
        reviewed_at: row.try_get("reviewed_at")?,
        published_recipe_id: row.try_get("published_recipe_id")?,
        revision: row.try_get("revision")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const UPDATE_USER_RECIPE: &str = r#"
    UPDATE user_recipes SET
        title = $1, description = $2, ingredients = $3, prep_minutes = $4,
        cook_minutes = $5, calories = $6, protein_g = $7, sugar_g = $8,
        sodium_mg = $9, fiber_g = $10, saturated_fat_g = $11, cuisines = $12,
        diet_tags = $13, flag_tags = $14, allergens = $15,
        visibility = $16, share_slug = $17, curation = $18, reviewer_id = $19,
        review_note = $20, reviewed_at = $21, published_recipe_id = $22,
        revision = $23, updated_at = $24
    WHERE id = $25 AND revision = $26
"#;

#[async_trait]
impl UserRecipeRepository for PgUserRecipeRepository {
    async fn insert(&self, recipe: &UserRecipe) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO user_recipes (
                {}, id, owner_id, visibility, revision, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21)
            "#,
            CONTENT_COLUMNS
        );
        bind_content(sqlx::query(&sql), &recipe.content)
            .bind(recipe.id)
            .bind(recipe.owner_id)
            .bind(recipe.visibility.as_str())
            .bind(recipe.revision)
            .bind(recipe.created_at)
            .bind(recipe.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserRecipe>> {
        let sql = format!("{} WHERE id = $1", user_recipe_select());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_recipe_from_row).transpose()?)
    }

    async fn find_shared(&self, slug: &str) -> Result<Option<UserRecipe>> {
        let sql = format!(
            "{} WHERE share_slug = $1 AND visibility = 'shared'",
            user_recipe_select()
        );
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_recipe_from_row).transpose()?)
    }

    async fn update(&self, recipe: &UserRecipe, expected_revision: i32) -> Result<bool> {
        let affected = bind_update(sqlx::query(UPDATE_USER_RECIPE), recipe, expected_revision)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected == 1)
    }

    async fn find_recipe(&self, id: Uuid) -> Result<Option<Recipe>> {
        let sql = format!("{} WHERE id = $1", recipe_select());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(recipe_from_row).transpose()?)
    }

    async fn approve(
        &self,
        recipe: &UserRecipe,
        expected_revision: i32,
        published: &Recipe,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let affected = bind_update(sqlx::query(UPDATE_USER_RECIPE), recipe, expected_revision)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        let sql = format!(
            r#"
            INSERT INTO recipes (
                {}, id, status, version, source_user_recipe_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title, description = EXCLUDED.description,
                ingredients = EXCLUDED.ingredients, prep_minutes = EXCLUDED.prep_minutes,
                cook_minutes = EXCLUDED.cook_minutes, calories = EXCLUDED.calories,
                protein_g = EXCLUDED.protein_g, sugar_g = EXCLUDED.sugar_g,
                sodium_mg = EXCLUDED.sodium_mg, fiber_g = EXCLUDED.fiber_g,
                saturated_fat_g = EXCLUDED.saturated_fat_g, cuisines = EXCLUDED.cuisines,
                diet_tags = EXCLUDED.diet_tags, flag_tags = EXCLUDED.flag_tags,
                allergens = EXCLUDED.allergens, status = EXCLUDED.status,
                version = EXCLUDED.version, updated_at = EXCLUDED.updated_at
            "#,
            CONTENT_COLUMNS
        );
        bind_content(sqlx::query(&sql), &published.content)
            .bind(published.id)
            .bind(published.status.as_str())
            .bind(published.version)
            .bind(published.source_user_recipe_id)
            .bind(published.created_at)
            .bind(published.updated_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

fn bind_update<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    recipe: &'q UserRecipe,
    expected_revision: i32,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    bind_content(query, &recipe.content)
        .bind(recipe.visibility.as_str())
        .bind(recipe.share_slug.as_deref())
        .bind(recipe.curation.map(|c| c.as_str()))
        .bind(recipe.reviewer_id)
        .bind(recipe.review_note.as_deref())
        .bind(recipe.reviewed_at)
        .bind(recipe.published_recipe_id)
        .bind(recipe.revision)
        .bind(recipe.updated_at)
        .bind(recipe.id)
        .bind(expected_revision)
}
