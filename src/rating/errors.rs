use serde::Serialize;
use thiserror::Error;

use super::models::{GameId, PlayerId, ResultId};

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RatingError {
    /// The teams of a result do not fit the rating model (e.g. elo given a 2v2).
    #[error("Shape violation in result {result_id}: {reason}")]
    ShapeViolation { result_id: ResultId, reason: String },

    #[error("Missing rating data for player {player_id}")]
    MissingRatingData { player_id: PlayerId },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Recalculation of game {game_id} left {} failure(s) behind", failures.len())]
    RecalculationInconsistency {
        game_id: GameId,
        failures: Vec<RatingError>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl RatingError {
    /// Warnings leave ratings stale but consistent; failures mean the store
    /// diverged from what was computed.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, RatingError::Store(_))
    }
}

impl From<sqlx::Error> for RatingError {
    fn from(err: sqlx::Error) -> Self {
        RatingError::Store(err.to_string())
    }
}
