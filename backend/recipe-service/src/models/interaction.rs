use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Whether a user has a recipe in their saved set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Saved,
    NotSaved,
}

impl Membership {
    pub fn from_saved(saved: bool) -> Self {
        if saved {
            Membership::Saved
        } else {
            Membership::NotSaved
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Membership::Saved)
    }

    pub fn toggled(&self) -> Self {
        match self {
            Membership::Saved => Membership::NotSaved,
            Membership::NotSaved => Membership::Saved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecipe {
    pub user_id: Uuid,
    pub recipe_id: Uuid,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Viewed,
    Cooked,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Viewed => "viewed",
            EventKind::Cooked => "cooked",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewed" => Ok(EventKind::Viewed),
            "cooked" => Ok(EventKind::Cooked),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipe_id: Uuid,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn new(user_id: Uuid, recipe_id: Uuid, kind: EventKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            recipe_id,
            kind,
            occurred_at: now,
        }
    }
}
