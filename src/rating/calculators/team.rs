//! Simplified TrueSkill-style update for ranked teams.
//!
//! Each team is reduced to a Gaussian (mean of member means, variance of the
//! member average) and every adjacent pair in rank order is treated as an
//! independent two-team match. This is a chain of pairwise updates, not full
//! factor-graph inference.

use std::collections::BTreeMap;

use super::super::{
    GameResult, PlayerId, PriorRating, RatingCalculator, RatingError, RatingModel, RatingUpdate,
    SkillBelief, Team,
};
use super::ensure_distinct_players;

/// Performance noise shared by every player.
pub const BETA: f64 = 4.166;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamRatingUpdate {
    pub mean: f64,
    pub deviation: f64,
    /// Conservative estimate, `floor((mean - 3 * deviation) * 100)`.
    pub value: i32,
}

impl From<TeamRatingUpdate> for RatingUpdate {
    fn from(update: TeamRatingUpdate) -> Self {
        RatingUpdate {
            value: update.value,
            belief: Some(SkillBelief {
                mean: update.mean,
                deviation: update.deviation,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TeamAggregate {
    rank: u32,
    mean: f64,
    variance: f64,
}

impl TeamAggregate {
    fn of(team: &Team, priors: &BTreeMap<PlayerId, SkillBelief>) -> Self {
        let members = team.players.len();
        let (mut mean, mut variance) = (0.0, 0.0);
        for belief in team.player_ids().filter_map(|id| priors.get(&id)) {
            mean += belief.mean;
            variance += belief.deviation.powi(2);
        }
        if members > 0 {
            let n = members as f64;
            mean /= n;
            variance /= n * n;
        }
        Self {
            rank: team.rank,
            mean,
            variance,
        }
    }
}

pub fn conservative_value(belief: SkillBelief) -> i32 {
    ((belief.mean - 3.0 * belief.deviation) * 100.0).floor() as i32
}

fn win_probability(skill_diff: f64, total_variance: f64) -> f64 {
    let sign = if skill_diff > 0.0 {
        1.0
    } else if skill_diff < 0.0 {
        -1.0
    } else {
        0.0
    };
    0.5 * (1.0 + sign * (1.0 - (-skill_diff.powi(2) / (2.0 * total_variance)).exp()))
}

/// Computes new beliefs for every player with a prior. `teams` may be in any
/// order; they are ranked before pairing. Players without a prior are left out
/// of both the team aggregate and the output.
pub fn compute_team_ratings(
    teams: &[Team],
    priors: &BTreeMap<PlayerId, SkillBelief>,
) -> BTreeMap<PlayerId, TeamRatingUpdate> {
    let mut ranked: Vec<&Team> = teams.iter().collect();
    ranked.sort_by_key(|t| t.rank);

    let aggregates: Vec<TeamAggregate> = ranked
        .iter()
        .map(|team| TeamAggregate::of(team, priors))
        .collect();

    // Members of middle teams take part in two pairings and carry the first
    // update into the second.
    let mut current: BTreeMap<PlayerId, SkillBelief> = BTreeMap::new();

    for (pair, window) in aggregates.windows(2).enumerate() {
        let (better, worse) = (window[0], window[1]);

        let skill_diff = better.mean - worse.mean;
        let total_variance = better.variance + worse.variance + 2.0 * BETA.powi(2);
        let margin = if better.rank == worse.rank { 0.0 } else { 1.0 };

        let p = win_probability(skill_diff, total_variance);
        let w = p * (1.0 - p);

        // Snapshot both sides before touching either.
        let sides = [(ranked[pair], 1.0), (ranked[pair + 1], -1.0)];
        let snapshot: Vec<(PlayerId, SkillBelief, f64)> = sides
            .into_iter()
            .flat_map(|(team, sign)| {
                team.player_ids()
                    .filter_map(|id| {
                        current
                            .get(&id)
                            .or_else(|| priors.get(&id))
                            .map(|belief| (id, *belief, sign))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for (id, belief, sign) in snapshot {
            let variance = belief.deviation.powi(2);
            let mean_delta = variance / total_variance.sqrt() * margin * sign;
            let shrink = (1.0 - variance / total_variance * w).max(0.0);
            current.insert(
                id,
                SkillBelief {
                    mean: belief.mean + mean_delta,
                    deviation: belief.deviation * shrink.sqrt(),
                },
            );
        }
    }

    current
        .into_iter()
        .map(|(id, belief)| {
            (
                id,
                TeamRatingUpdate {
                    mean: belief.mean,
                    deviation: belief.deviation,
                    value: conservative_value(belief),
                },
            )
        })
        .collect()
}

#[derive(Default)]
pub struct TeamRatingCalculator;

impl TeamRatingCalculator {
    pub fn new() -> Self {
        Self
    }
}

impl RatingCalculator for TeamRatingCalculator {
    fn model(&self) -> RatingModel {
        RatingModel::TeamRating
    }

    fn check_shape(&self, result: &GameResult) -> Result<(), RatingError> {
        if result.teams.len() < 2 {
            return Err(RatingError::ShapeViolation {
                result_id: result.id,
                reason: format!("at least two teams required, got {}", result.teams.len()),
            });
        }
        if let Some(team) = result.teams.iter().find(|t| t.players.is_empty()) {
            return Err(RatingError::ShapeViolation {
                result_id: result.id,
                reason: format!("team ranked {} has no players", team.rank),
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

        let beliefs: BTreeMap<PlayerId, SkillBelief> =
            priors.iter().map(|(id, prior)| (*id, prior.belief)).collect();

        Ok(compute_team_ratings(&result.teams, &beliefs)
            .into_iter()
            .map(|(id, update)| (id, update.into()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::Player;

    const EPSILON: f64 = 1e-9;

    fn team(rank: u32, ids: &[PlayerId]) -> Team {
        Team::new(
            rank,
            ids.iter().map(|id| Player::new(*id, format!("p{id}"))).collect(),
        )
    }

    fn defaults(ids: &[PlayerId]) -> BTreeMap<PlayerId, SkillBelief> {
        ids.iter().map(|id| (*id, SkillBelief::default())).collect()
    }

    #[test]
    fn symmetric_one_on_one_moves_means_equally() {
        let updates = compute_team_ratings(&[team(1, &[1]), team(2, &[2])], &defaults(&[1, 2]));

        let winner = updates[&1];
        let loser = updates[&2];
        let up = winner.mean - 25.0;
        let down = 25.0 - loser.mean;

        assert!(up > 0.0);
        assert!((up - down).abs() < EPSILON);
        assert!((winner.deviation - loser.deviation).abs() < EPSILON);
        assert!(winner.deviation < 8.333);
    }

    #[test]
    fn matches_hand_computed_values() {
        let updates = compute_team_ratings(&[team(1, &[1]), team(2, &[2])], &defaults(&[1, 2]));

        let variance = 8.333f64.powi(2);
        let total_variance = 2.0 * variance + 2.0 * BETA.powi(2);
        let expected_mean = 25.0 + variance / total_variance.sqrt();
        let expected_dev = 8.333 * (1.0 - variance / total_variance * 0.25).sqrt();

        assert!((updates[&1].mean - expected_mean).abs() < EPSILON);
        assert!((updates[&1].deviation - expected_dev).abs() < EPSILON);
        assert_eq!(
            updates[&1].value,
            ((expected_mean - 3.0 * expected_dev) * 100.0).floor() as i32
        );
    }

    #[test]
    fn tie_keeps_means_and_shrinks_deviation() {
        let updates = compute_team_ratings(&[team(1, &[1]), team(1, &[2])], &defaults(&[1, 2]));

        for id in [1, 2] {
            assert!((updates[&id].mean - 25.0).abs() < EPSILON);
            assert!(updates[&id].deviation < 8.333);
        }
    }

    #[test]
    fn input_order_does_not_matter() {
        let priors = defaults(&[1, 2, 3, 4]);
        let forward = compute_team_ratings(&[team(1, &[1, 2]), team(2, &[3, 4])], &priors);
        let backward = compute_team_ratings(&[team(2, &[3, 4]), team(1, &[1, 2])], &priors);
        assert_eq!(forward, backward);
    }

    #[test]
    fn middle_team_accumulates_both_pairings() {
        let priors = defaults(&[1, 2, 3]);
        let updates =
            compute_team_ratings(&[team(1, &[1]), team(2, &[2]), team(3, &[3])], &priors);

        // Loses to the first, then beats the third with an already narrowed
        // deviation, so the gain is smaller than the loss.
        assert!(updates[&2].mean < 25.0);
        assert!(updates[&2].mean > updates[&3].mean);
        assert!(updates[&2].deviation < updates[&1].deviation);
        assert!(updates[&1].mean > 25.0);
        assert!(updates[&3].mean < 25.0);
    }

    #[test]
    fn team_without_resolvable_priors_does_not_divide_by_zero() {
        let priors = defaults(&[1]);
        let updates = compute_team_ratings(&[team(1, &[1]), team(2, &[9])], &priors);

        assert_eq!(updates.len(), 1);
        let winner = updates[&1];
        assert!(winner.mean.is_finite());
        assert!(winner.deviation.is_finite());
        assert!(winner.mean > 25.0);
    }

    #[test]
    fn empty_team_contributes_nothing() {
        let priors = defaults(&[1]);
        let updates = compute_team_ratings(&[team(1, &[1]), team(2, &[])], &priors);
        assert!(updates[&1].mean.is_finite());
    }

    #[test]
    fn calculator_rejects_single_team() {
        let calculator = TeamRatingCalculator::new();
        let result = GameResult {
            id: 5,
            game_id: 1,
            created_at: chrono::Utc::now(),
            teams: vec![team(1, &[1, 2])],
        };
        assert!(matches!(
            calculator.check_shape(&result),
            Err(RatingError::ShapeViolation { result_id: 5, .. })
        ));
    }

    #[test]
    fn calculator_reports_beliefs() {
        let calculator = TeamRatingCalculator::new();
        let result = GameResult {
            id: 6,
            game_id: 1,
            created_at: chrono::Utc::now(),
            teams: vec![team(1, &[1, 2]), team(2, &[3, 4])],
        };
        let priors: BTreeMap<PlayerId, PriorRating> =
            (1..=4).map(|id| (id, PriorRating::default())).collect();

        let updates = calculator.calculate(&result, &priors).unwrap();
        assert_eq!(updates.len(), 4);
        assert!(updates.values().all(|u| u.belief.is_some()));
        assert!(updates[&1].belief.unwrap().mean > updates[&3].belief.unwrap().mean);
    }
}
