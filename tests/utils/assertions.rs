//! Assertion helpers for comparing rating state across stores
#![allow(dead_code)]

use std::collections::BTreeMap;

use elovation::rating::{Rating, RatingStore};

use super::setup::TestSetup;

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Snapshot of one game's ratings and history keyed by player, independent
/// of store-assigned ids.
#[derive(Debug, PartialEq)]
pub struct RatingAssertion {
    pub ratings: BTreeMap<i64, (i32, f64, f64)>,
    pub history: BTreeMap<i64, Vec<(i32, Option<f64>, Option<f64>)>>,
}

impl RatingAssertion {
    pub async fn capture(setup: &TestSetup, game_id: i64) -> Self {
        let ratings: Vec<Rating> = setup.store.ratings_for_game(game_id).await.unwrap();

        let mut history = BTreeMap::new();
        for rating in &ratings {
            let events = setup.store.history_for_rating(rating.id).await.unwrap();
            history.insert(
                rating.player_id,
                events
                    .into_iter()
                    .map(|e| (e.value, e.mean, e.deviation))
                    .collect(),
            );
        }

        Self {
            ratings: ratings
                .into_iter()
                .map(|r| (r.player_id, (r.value, r.mean, r.deviation)))
                .collect(),
            history,
        }
    }

    /// Every rating equals the last event of its history.
    pub fn history_ends_at_current_values(&self) {
        for (player_id, (value, _, _)) in &self.ratings {
            let last = self.history.get(player_id).and_then(|h| h.last());
            if let Some((last_value, _, _)) = last {
                assert_eq!(
                    last_value, value,
                    "player {player_id} history does not end at the current value"
                );
            }
        }
    }
}
