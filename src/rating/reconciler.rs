use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, instrument};

use super::{GameId, NewRating, PlayerId, Rating, RatingError, RatingMap, RatingStore};

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Ratings this call had to insert.
    pub created: Vec<Rating>,
    /// Every rating known for the roster afterwards, including pre-existing ones.
    pub all: RatingMap,
    pub failures: Vec<RatingError>,
}

/// Makes sure every participant of a game has a rating row.
pub struct RatingReconciler {
    store: Arc<dyn RatingStore>,
}

impl RatingReconciler {
    pub fn new(store: Arc<dyn RatingStore>) -> Self {
        Self { store }
    }

    /// Creates default ratings for roster players missing from `existing`.
    ///
    /// The store is asked for the (player, game) row before inserting, and the
    /// insert itself returns an existing row on conflict, so repeated calls with
    /// the same roster never duplicate ratings. A failure for one player is
    /// collected and the others are still processed.
    #[instrument(skip(self, roster, existing), fields(roster = roster.len()))]
    pub async fn ensure_ratings(
        &self,
        game_id: GameId,
        roster: &BTreeSet<PlayerId>,
        existing: RatingMap,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            all: existing,
            ..ReconcileOutcome::default()
        };

        for &player_id in roster {
            if outcome.all.contains_key(&player_id) {
                continue;
            }

            match self.find_or_create(player_id, game_id).await {
                Ok((rating, created)) => {
                    if created {
                        debug!(
                            player_id,
                            game_id,
                            rating_id = rating.id,
                            "Created default rating"
                        );
                        outcome.created.push(rating.clone());
                    }
                    outcome.all.insert(player_id, rating);
                }
                Err(err) => {
                    error!(?err, player_id, game_id, "Failed to create default rating");
                    outcome.failures.push(err);
                }
            }
        }

        outcome
    }

    async fn find_or_create(
        &self,
        player_id: PlayerId,
        game_id: GameId,
    ) -> Result<(Rating, bool), RatingError> {
        if let Some(rating) = self.store.find_rating(player_id, game_id).await? {
            return Ok((rating, false));
        }
        let rating = self
            .store
            .insert_rating(&NewRating::default_for(player_id, game_id))
            .await?;
        Ok((rating, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::test_utils::FlakyStore;
    use crate::rating::InMemoryRatingStore;

    fn roster(ids: &[PlayerId]) -> BTreeSet<PlayerId> {
        ids.iter().copied().collect()
    }

    #[tokio::test]
    async fn creates_defaults_for_new_players() {
        let store = Arc::new(InMemoryRatingStore::new());
        let reconciler = RatingReconciler::new(store.clone());

        let outcome = reconciler
            .ensure_ratings(1, &roster(&[1, 2]), RatingMap::new())
            .await;

        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.all.len(), 2);
        assert!(outcome.failures.is_empty());
        let rating = &outcome.all[&1];
        assert_eq!(rating.value, 1000);
        assert_eq!(rating.mean, 25.0);
        assert_eq!(rating.deviation, 8.333);
    }

    #[tokio::test]
    async fn second_call_with_same_roster_creates_nothing() {
        let store = Arc::new(InMemoryRatingStore::new());
        let reconciler = RatingReconciler::new(store.clone());

        reconciler
            .ensure_ratings(1, &roster(&[1, 2]), RatingMap::new())
            .await;
        // Stale caller view: the existing map is empty again.
        let again = reconciler
            .ensure_ratings(1, &roster(&[1, 2]), RatingMap::new())
            .await;

        assert!(again.created.is_empty());
        assert_eq!(again.all.len(), 2);
        assert_eq!(store.rating_count().await, 2);
    }

    #[tokio::test]
    async fn keeps_existing_ratings_untouched() {
        let store = Arc::new(InMemoryRatingStore::new());
        let mut existing = store
            .insert_rating(&NewRating::default_for(1, 1))
            .await
            .unwrap();
        existing.value = 1200;
        store.update_rating(&existing).await.unwrap();

        let reconciler = RatingReconciler::new(store.clone());
        let outcome = reconciler
            .ensure_ratings(
                1,
                &roster(&[1, 2]),
                RatingMap::from([(1, existing.clone())]),
            )
            .await;

        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.all[&1].value, 1200);
    }

    #[tokio::test]
    async fn failure_for_one_player_does_not_stop_the_rest() {
        let store = Arc::new(FlakyStore::new(InMemoryRatingStore::new()));
        store.refuse_insert_for(2);
        let reconciler = RatingReconciler::new(store.clone());

        let outcome = reconciler
            .ensure_ratings(1, &roster(&[1, 2, 3]), RatingMap::new())
            .await;

        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.all.contains_key(&1));
        assert!(!outcome.all.contains_key(&2));
        assert!(outcome.all.contains_key(&3));
    }
}
