//! Interaction Ledger contract
//!
//! Saved-recipe membership and the view/cook event log. The two mutation
//! rules are explicit transitions so they can be tested without storage:
//!
//! | Mutation     | Pre-state                          | Post-state                  |
//! |--------------|------------------------------------|-----------------------------|
//! | toggle save  | `Saved`                            | `NotSaved`                  |
//! | toggle save  | `NotSaved`                         | `Saved`                     |
//! | record view  | a view exists within the hour      | unchanged, prior view back  |
//! | record view  | no view within the hour            | new view appended           |
//! | record cook  | any                                | new cook appended           |
//!
//! Toggle is applied as a compare-and-set on the pre-state: when a
//! concurrent request already moved the membership, the loser reports the
//! state the winner produced instead of flipping it back.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{EventKind, HistoryEvent, Membership, SavedRecipe};

/// Views of the same recipe by the same user inside this window collapse.
pub fn view_dedup_window() -> Duration {
    Duration::hours(1)
}

/// Look-back of the user-facing history feed.
pub fn history_feed_window() -> Duration {
    Duration::days(180)
}

/// Result of a compare-and-set on membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// The stored state did not match the expected pre-state
    Conflict(Membership),
}

/// What recording an event should do given the latest prior view.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDecision {
    Append,
    Collapse(HistoryEvent),
}

/// Recorded (or collapsed) event.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub event: HistoryEvent,
    /// `true` when an earlier view was returned instead of appending
    pub collapsed: bool,
}

/// Pre/post state of a save toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTransition {
    pub from: Membership,
    pub to: Membership,
}

impl SaveTransition {
    pub fn toggle(current: Membership) -> Self {
        Self {
            from: current,
            to: current.toggled(),
        }
    }
}

/// Decide whether a new event is appended or collapses into `latest_view`.
pub fn decide_event(
    kind: EventKind,
    latest_view: Option<&HistoryEvent>,
    now: DateTime<Utc>,
    window: Duration,
) -> EventDecision {
    match (kind, latest_view) {
        (EventKind::Viewed, Some(prior))
            if prior.kind == EventKind::Viewed && now - prior.occurred_at < window =>
        {
            EventDecision::Collapse(prior.clone())
        }
        _ => EventDecision::Append,
    }
}

/// Durable membership set and event log.
#[async_trait]
pub trait InteractionLedger: Send + Sync {
    async fn membership(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Membership>;

    /// Move membership from `transition.from` to `transition.to` atomically.
    async fn compare_and_set_membership(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        transition: SaveTransition,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome>;

    /// Saved recipes, newest save first; returns the page and the total count.
    async fn saved(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SavedRecipe>, usize)>;

    /// Append an event, collapsing repeated views per [`decide_event`].
    /// Must be atomic per `(user, recipe)`.
    async fn record_event(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        kind: EventKind,
        now: DateTime<Utc>,
    ) -> Result<RecordedEvent>;

    /// The user's events on `recipe_ids` since `since`, for the repeat penalty.
    async fn touches(
        &self,
        user_id: Uuid,
        recipe_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryEvent>>;

    /// Events since `since`, newest first; returns the page and the total count.
    async fn history(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<HistoryEvent>, usize)>;
}

/// Flip membership with compare-and-set and return the resulting state.
///
/// Repeating a toggle that lost a race yields the winner's state, so
/// duplicates of one logical toggle converge instead of undoing each other.
pub async fn toggle_save(
    ledger: &dyn InteractionLedger,
    user_id: Uuid,
    recipe_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Membership> {
    let current = ledger.membership(user_id, recipe_id).await?;
    let transition = SaveTransition::toggle(current);

    match ledger
        .compare_and_set_membership(user_id, recipe_id, transition, now)
        .await?
    {
        CasOutcome::Applied => Ok(transition.to),
        CasOutcome::Conflict(actual) => {
            debug!(
                user_id = %user_id,
                recipe_id = %recipe_id,
                actual = ?actual,
                "Save toggle lost a race, reporting current membership"
            );
            Ok(actual)
        }
    }
}
