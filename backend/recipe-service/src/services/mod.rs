/// Business logic layer for recipe-service
///
/// - `filter_compiler`: raw query parameters → validated predicate set
/// - `scoring`: the five ranking signals and their weighted sum
/// - `sequencer`: total ordering and offset pagination
/// - `ledger`: saved-recipe membership and view/cook events
/// - `popularity`: periodically refreshed interaction aggregate
/// - `search`: the end-to-end search pipeline
/// - `curation`: user recipe sharing, submission and review
pub mod curation;
pub mod filter_compiler;
pub mod ledger;
pub mod popularity;
pub mod scoring;
pub mod search;
pub mod sequencer;

pub use curation::{CurationService, ReviewDecision, UserRecipeRepository};
pub use filter_compiler::{CompiledFilter, RawSearchQuery, SearchRequest, Taxonomy};
pub use ledger::{toggle_save, InteractionLedger};
pub use popularity::{PopularityBoard, PopularitySource};
pub use scoring::{ScoredRecipe, ScoringEngine, ScoringParams, ScoringWeights, SignalBreakdown};
pub use search::{Candidate, CandidateSet, RecipeCorpus, SearchService};
pub use sequencer::{Page, PageRequest, SortMode};
