use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{content_from_row, decode_enum, CONTENT_COLUMNS};
use crate::error::Result;
use crate::models::Recipe;
use crate::services::filter_compiler::CompiledFilter;
use crate::services::search::{Candidate, CandidateSet, RecipeCorpus};

/// Published catalogue read from PostgreSQL.
///
/// Structural predicates and the full-text match both run in SQL, against
/// the generated `search_tsv` column, so the candidate limit applies to real
/// matches only. Text rank is `ts_rank_cd` over that column.
#[derive(Clone)]
pub struct PgRecipeCorpus {
    pool: PgPool,
}

impl PgRecipeCorpus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn recipe_from_row(row: &PgRow) -> std::result::Result<Recipe, sqlx::Error> {
    let content = content_from_row(row)?;
    Ok(Recipe {
        id: row.try_get("id")?,
        content,
        status: decode_enum(row, "status")?,
        version: row.try_get("version")?,
        source_user_recipe_id: row.try_get("source_user_recipe_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn recipe_select() -> String {
    format!(
        "SELECT id, {}, status, version, source_user_recipe_id, created_at, updated_at FROM recipes",
        CONTENT_COLUMNS
    )
}

#[async_trait]
impl RecipeCorpus for PgRecipeCorpus {
    async fn candidates(&self, filter: &CompiledFilter, limit: usize) -> Result<CandidateSet> {
        // A query of only stop words parses to an empty tsquery; treat it
        // as no text rather than matching nothing.
        let sql = format!(
            r#"
            WITH q AS (
                SELECT query, $12::text IS NOT NULL AND numnode(query) > 0 AS active
                FROM (SELECT websearch_to_tsquery('english', coalesce($12::text, '')) AS query) parsed
            )
            SELECT id, {}, status, version, source_user_recipe_id, created_at, updated_at,
                   CASE WHEN q.active THEN ts_rank_cd(search_tsv, q.query)::float8
                        ELSE 0::float8 END AS text_rank,
                   COUNT(*) OVER () AS matched
            FROM recipes CROSS JOIN q
            WHERE status = 'published'
              AND (NOT q.active OR search_tsv @@ q.query)
              AND diet_tags @> $1::text[]
              AND NOT (allergens && $2::text[])
              AND (cardinality($3::text[]) = 0 OR cuisines && $3::text[])
              AND ($4::float8 IS NULL OR calories >= $4)
              AND ($5::float8 IS NULL OR calories <= $5)
              AND ($6::float8 IS NULL OR protein_g >= $6)
              AND ($7::float8 IS NULL OR sugar_g <= $7)
              AND ($8::float8 IS NULL OR sodium_mg <= $8)
              AND ($9::float8 IS NULL OR fiber_g >= $9)
              AND ($10::float8 IS NULL OR saturated_fat_g <= $10)
              AND ($11::int4 IS NULL OR prep_minutes + cook_minutes <= $11)
            ORDER BY text_rank DESC, updated_at DESC, id ASC
            LIMIT $13
            "#,
            CONTENT_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(filter.diets.iter().cloned().collect::<Vec<String>>())
            .bind(filter.allergens.iter().cloned().collect::<Vec<String>>())
            .bind(filter.cuisines.iter().cloned().collect::<Vec<String>>())
            .bind(filter.calories.min)
            .bind(filter.calories.max)
            .bind(filter.protein.min)
            .bind(filter.sugar.max)
            .bind(filter.sodium.max)
            .bind(filter.fiber.min)
            .bind(filter.saturated_fat.max)
            .bind(filter.time_max)
            .bind(filter.text.as_deref())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let matched = match rows.first() {
            Some(row) => row.try_get::<i64, _>("matched")?.max(0) as u64,
            None => 0,
        };
        let candidates = rows
            .iter()
            .map(|row| {
                Ok(Candidate {
                    recipe: recipe_from_row(row)?,
                    text_rank: row.try_get("text_rank")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok(CandidateSet {
            candidates,
            matched,
        })
    }

    async fn find_published(&self, id: Uuid) -> Result<Option<Recipe>> {
        let sql = format!("{} WHERE id = $1 AND status = 'published'", recipe_select());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(recipe_from_row).transpose()?)
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Recipe>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE id = ANY($1) AND status = 'published'",
            recipe_select()
        );
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(recipe_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
