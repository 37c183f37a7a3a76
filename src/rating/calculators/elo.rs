use std::collections::BTreeMap;

use super::super::{
    GameResult, PlayerId, PriorRating, RatingCalculator, RatingError, RatingModel, RatingUpdate,
};
use super::ensure_distinct_players;

pub const DEFAULT_K_FACTOR: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EloOutcome {
    pub new_winner: i32,
    pub new_loser: i32,
}

/// Probability that a player rated `rating` scores against one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

/// Updates both sides of a one-on-one result. On a tie the "winner" is simply
/// the first side.
pub fn compute_elo(
    winner_rating: i32,
    loser_rating: i32,
    is_tie: bool,
    k_factor: f64,
) -> EloOutcome {
    let winner = f64::from(winner_rating);
    let loser = f64::from(loser_rating);

    let expected_winner = expected_score(winner, loser);
    let expected_loser = expected_score(loser, winner);

    let (actual_winner, actual_loser) = if is_tie { (0.5, 0.5) } else { (1.0, 0.0) };

    EloOutcome {
        new_winner: round_half_up(winner + k_factor * (actual_winner - expected_winner)),
        new_loser: round_half_up(loser + k_factor * (actual_loser - expected_loser)),
    }
}

fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

pub struct EloCalculator {
    k_factor: f64,
}

impl Default for EloCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_K_FACTOR)
    }
}

impl EloCalculator {
    pub fn new(k_factor: f64) -> Self {
        Self { k_factor }
    }

    pub fn k_factor(&self) -> f64 {
        self.k_factor
    }
}

impl RatingCalculator for EloCalculator {
    fn model(&self) -> RatingModel {
        RatingModel::Elo
    }

    fn check_shape(&self, result: &GameResult) -> Result<(), RatingError> {
        let one_on_one =
            result.teams.len() == 2 && result.teams.iter().all(|t| t.players.len() == 1);
        if !one_on_one {
            let sizes: Vec<String> = result
                .teams
                .iter()
                .map(|t| t.players.len().to_string())
                .collect();
            return Err(RatingError::ShapeViolation {
                result_id: result.id,
                reason: format!(
                    "elo requires exactly two teams of one player, got teams of [{}]",
                    sizes.join(", ")
                ),
            });
        }
        ensure_distinct_players(result)
    }

    fn calculate(
        &self,
        result: &GameResult,
        priors: &BTreeMap<PlayerId, PriorRating>,
    ) -> Result<BTreeMap<PlayerId, RatingUpdate>, RatingError> {
        self.check_shape(result)?;

        let teams = result.teams_by_rank();
        let winner_id = teams[0].players[0].id;
        let loser_id = teams[1].players[0].id;
        let is_tie = teams[0].rank == teams[1].rank;

        let winner = priors.get(&winner_id).copied().unwrap_or_default();
        let loser = priors.get(&loser_id).copied().unwrap_or_default();

        let outcome = compute_elo(winner.value, loser.value, is_tie, self.k_factor);

        Ok(BTreeMap::from([
            (
                winner_id,
                RatingUpdate {
                    value: outcome.new_winner,
                    belief: None,
                },
            ),
            (
                loser_id,
                RatingUpdate {
                    value: outcome.new_loser,
                    belief: None,
                },
            ),
        ]))
    }
}
