//! Filter Compiler
//!
//! Turns raw search parameters into a [`SearchRequest`]: a normalized
//! predicate set plus sort and page. Every problem is collected; the caller
//! gets all of them in one 400 instead of fixing one field per round trip.
//!
//! | Parameter            | Semantics                                   |
//! |----------------------|---------------------------------------------|
//! | `diet`               | AND: candidate carries every requested tag  |
//! | `allergens`          | exclusion: candidate carries none of them   |
//! | `cuisine`            | OR: candidate carries at least one          |
//! | numeric bounds       | independent inclusive ranges                |
//! | `time_max`           | prep + cook minutes <= bound                |
//! | `q`                  | full-text match ranked by the corpus        |

use error_types::{error_codes, FieldViolation};
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::models::Recipe;
use crate::services::sequencer::{PageRequest, SortMode};

const MAX_QUERY_LEN: usize = 200;

/// Known diet, allergen and cuisine tokens.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    diets: BTreeSet<String>,
    allergens: BTreeSet<String>,
    cuisines: BTreeSet<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new(
            &[
                "vegetarian",
                "vegan",
                "pescatarian",
                "gluten_free",
                "dairy_free",
                "nut_free",
                "keto",
                "paleo",
                "low_carb",
                "low_fodmap",
                "halal",
                "kosher",
            ],
            &[
                "gluten",
                "dairy",
                "egg",
                "peanut",
                "tree_nut",
                "soy",
                "fish",
                "shellfish",
                "sesame",
                "mustard",
                "celery",
                "sulphites",
                "lupin",
                "mollusc",
            ],
            &[
                "american",
                "british",
                "chinese",
                "french",
                "greek",
                "indian",
                "italian",
                "japanese",
                "korean",
                "mediterranean",
                "mexican",
                "middle_eastern",
                "spanish",
                "thai",
                "vietnamese",
            ],
        )
    }
}

impl Taxonomy {
    pub fn new(diets: &[&str], allergens: &[&str], cuisines: &[&str]) -> Self {
        let set = |items: &[&str]| items.iter().map(|s| normalize_token(s)).collect();
        Self {
            diets: set(diets),
            allergens: set(allergens),
            cuisines: set(cuisines),
        }
    }

    /// Validate the tag lists of authored content, reporting every unknown token.
    pub fn check_tags(
        &self,
        diets: &[String],
        allergens: &[String],
        cuisines: &[String],
    ) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        for (field, values, known) in [
            ("diet_tags", diets, &self.diets),
            ("allergens", allergens, &self.allergens),
            ("cuisines", cuisines, &self.cuisines),
        ] {
            for value in values {
                if !known.contains(&normalize_token(value)) {
                    violations.push(unknown_token(field, value));
                }
            }
        }
        violations
    }
}

/// Lowercase, trim and join words with `_`: `"Gluten-Free"` -> `"gluten_free"`.
pub fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn unknown_token(field: &str, value: &str) -> FieldViolation {
    FieldViolation::new(
        field,
        error_codes::UNKNOWN_TOKEN,
        format!("'{}' is not a known {} value", value.trim(), field),
    )
}

/// Search parameters exactly as they arrived on the query string.
///
/// Numbers stay strings so parse failures are reported alongside every
/// other violation instead of aborting extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSearchQuery {
    pub q: Option<String>,
    pub diet: Option<String>,
    pub allergens: Option<String>,
    pub cuisine: Option<String>,
    pub calories_min: Option<String>,
    pub calories_max: Option<String>,
    pub protein_min: Option<String>,
    pub sugar_max: Option<String>,
    pub sodium_max: Option<String>,
    pub fiber_min: Option<String>,
    pub saturated_fat_max: Option<String>,
    pub time_max: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Inclusive range; a missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Normalized predicate set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    /// Trimmed free text; `None` when none was given
    pub text: Option<String>,
    pub diets: BTreeSet<String>,
    pub allergens: BTreeSet<String>,
    pub cuisines: BTreeSet<String>,
    pub calories: NumericRange,
    pub protein: NumericRange,
    pub sugar: NumericRange,
    pub sodium: NumericRange,
    pub fiber: NumericRange,
    pub saturated_fat: NumericRange,
    pub time_max: Option<i32>,
}

impl CompiledFilter {
    /// Structural predicates (everything except free text).
    ///
    /// A saturated-fat bound excludes recipes that do not report saturated
    /// fat, since the bound cannot be verified for them.
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let n = &recipe.content.nutrition;

        self.diets.iter().all(|d| recipe.has_diet(d))
            && !self.allergens.iter().any(|a| recipe.has_allergen(a))
            && (self.cuisines.is_empty() || self.cuisines.iter().any(|c| recipe.has_cuisine(c)))
            && self.calories.contains(n.calories)
            && self.protein.contains(n.protein_g)
            && self.sugar.contains(n.sugar_g)
            && self.sodium.contains(n.sodium_mg)
            && self.fiber.contains(n.fiber_g)
            && (self.saturated_fat.is_unbounded()
                || n.saturated_fat_g.map_or(false, |v| self.saturated_fat.contains(v)))
            && self.time_max.map_or(true, |max| recipe.total_minutes() <= max)
    }

    /// Number of requested diet and cuisine tags, the boost signal's denominator.
    pub fn requested_tag_count(&self) -> usize {
        self.diets.len() + self.cuisines.len()
    }
}

/// A fully validated search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub filter: CompiledFilter,
    pub sort: SortMode,
    pub page: PageRequest,
}

/// Compile raw parameters, collecting every violation.
pub fn compile(
    raw: &RawSearchQuery,
    taxonomy: &Taxonomy,
) -> Result<SearchRequest, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    let text = match raw.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) if q.chars().count() > MAX_QUERY_LEN => {
            violations.push(FieldViolation::new(
                "q",
                error_codes::TOO_LONG,
                format!("must be at most {} characters", MAX_QUERY_LEN),
            ));
            None
        }
        Some(q) => Some(q.to_string()),
        None => None,
    };

    let diets = parse_tokens("diet", raw.diet.as_deref(), &taxonomy.diets, &mut violations);
    let allergens = parse_tokens(
        "allergens",
        raw.allergens.as_deref(),
        &taxonomy.allergens,
        &mut violations,
    );
    let cuisines = parse_tokens(
        "cuisine",
        raw.cuisine.as_deref(),
        &taxonomy.cuisines,
        &mut violations,
    );

    let calories = NumericRange {
        min: parse_bound("calories_min", raw.calories_min.as_deref(), &mut violations),
        max: parse_bound("calories_max", raw.calories_max.as_deref(), &mut violations),
    };
    if let (Some(min), Some(max)) = (calories.min, calories.max) {
        if min > max {
            violations.push(FieldViolation::new(
                "calories_min",
                error_codes::CONTRADICTORY_BOUNDS,
                format!("calories_min ({}) is greater than calories_max ({})", min, max),
            ));
        }
    }

    let filter = CompiledFilter {
        text,
        diets,
        allergens,
        cuisines,
        calories,
        protein: NumericRange {
            min: parse_bound("protein_min", raw.protein_min.as_deref(), &mut violations),
            max: None,
        },
        sugar: NumericRange {
            min: None,
            max: parse_bound("sugar_max", raw.sugar_max.as_deref(), &mut violations),
        },
        sodium: NumericRange {
            min: None,
            max: parse_bound("sodium_max", raw.sodium_max.as_deref(), &mut violations),
        },
        fiber: NumericRange {
            min: parse_bound("fiber_min", raw.fiber_min.as_deref(), &mut violations),
            max: None,
        },
        saturated_fat: NumericRange {
            min: None,
            max: parse_bound(
                "saturated_fat_max",
                raw.saturated_fat_max.as_deref(),
                &mut violations,
            ),
        },
        time_max: parse_integer("time_max", raw.time_max.as_deref(), 0, &mut violations)
            .map(|v| v.min(i32::MAX as i64) as i32),
    };

    let sort = match raw.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => SortMode::Relevance,
        Some(s) => match s.parse::<SortMode>() {
            Ok(mode) => mode,
            Err(_) => {
                violations.push(FieldViolation::new(
                    "sort",
                    error_codes::UNKNOWN_TOKEN,
                    format!("'{}' is not one of relevance, newest, quickest", s),
                ));
                SortMode::Relevance
            }
        },
    };

    let limit = parse_integer("limit", raw.limit.as_deref(), 1, &mut violations);
    let offset = parse_integer("offset", raw.offset.as_deref(), 0, &mut violations);

    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(SearchRequest {
        filter,
        sort,
        page: PageRequest::new(limit, offset.unwrap_or(0)),
    })
}

fn parse_tokens(
    field: &str,
    raw: Option<&str>,
    known: &BTreeSet<String>,
    violations: &mut Vec<FieldViolation>,
) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for item in raw.unwrap_or_default().split(',') {
        if item.trim().is_empty() {
            continue;
        }
        let token = normalize_token(item);
        if known.contains(&token) {
            tokens.insert(token);
        } else {
            violations.push(unknown_token(field, item));
        }
    }
    tokens
}

/// Non-negative finite number, or `None` when absent.
fn parse_bound(field: &str, raw: Option<&str>, violations: &mut Vec<FieldViolation>) -> Option<f64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<f64>() {
        Ok(value) if !value.is_finite() => {
            violations.push(FieldViolation::new(
                field,
                error_codes::INVALID_NUMBER,
                format!("'{}' is not a finite number", raw),
            ));
            None
        }
        Ok(value) if value < 0.0 => {
            violations.push(FieldViolation::new(
                field,
                error_codes::OUT_OF_RANGE,
                format!("must be >= 0, got {}", value),
            ));
            None
        }
        Ok(value) => Some(value),
        Err(_) => {
            violations.push(FieldViolation::new(
                field,
                error_codes::INVALID_NUMBER,
                format!("'{}' is not a number", raw),
            ));
            None
        }
    }
}

fn parse_integer(
    field: &str,
    raw: Option<&str>,
    min: i64,
    violations: &mut Vec<FieldViolation>,
) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<i64>() {
        Ok(value) if value < min => {
            violations.push(FieldViolation::new(
                field,
                error_codes::OUT_OF_RANGE,
                format!("must be >= {}, got {}", min, value),
            ));
            None
        }
        Ok(value) => Some(value),
        Err(_) => {
            violations.push(FieldViolation::new(
                field,
                error_codes::INVALID_NUMBER,
                format!("'{}' is not an integer", raw),
            ));
            None
        }
    }
}
