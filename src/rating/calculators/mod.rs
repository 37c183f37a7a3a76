pub mod elo;
pub mod team;

pub use elo::{compute_elo, expected_score, EloCalculator, EloOutcome, DEFAULT_K_FACTOR};
pub use team::{compute_team_ratings, conservative_value, TeamRatingCalculator, TeamRatingUpdate};

use std::collections::BTreeSet;

use super::{GameResult, RatingError};

/// A player may appear in at most one team of a result.
pub(crate) fn ensure_distinct_players(result: &GameResult) -> Result<(), RatingError> {
    let mut seen = BTreeSet::new();
    for id in result.teams.iter().flat_map(|t| t.player_ids()) {
        if !seen.insert(id) {
            return Err(RatingError::ShapeViolation {
                result_id: result.id,
                reason: format!("player {id} appears in more than one team"),
            });
        }
    }
    Ok(())
}
