use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{
    Game, GameId, GameResult, NewGameResult, NewHistoryEvent, NewRating, PlayerId, Rating,
    RatingError, RatingHistoryEvent, RatingId,
};

/// Data access the rating engine needs from the surrounding application.
#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, RatingError>;

    /// All results of a game with their teams and players, oldest first.
    async fn results_for_game(&self, game_id: GameId) -> Result<Vec<GameResult>, RatingError>;

    async fn ratings_for_game(&self, game_id: GameId) -> Result<Vec<Rating>, RatingError>;
    async fn ratings_for_players(
        &self,
        game_id: GameId,
        player_ids: &[PlayerId],
    ) -> Result<Vec<Rating>, RatingError>;
    /// Every rating one player holds, highest value first.
    async fn ratings_for_player(&self, player_id: PlayerId) -> Result<Vec<Rating>, RatingError>;
    async fn find_rating(
        &self,
        player_id: PlayerId,
        game_id: GameId,
    ) -> Result<Option<Rating>, RatingError>;

    /// Inserts a rating unless one already exists for (player, game), in which
    /// case the existing row is returned untouched.
    async fn insert_rating(&self, rating: &NewRating) -> Result<Rating, RatingError>;
    async fn update_rating(&self, rating: &Rating) -> Result<(), RatingError>;

    /// Events of one rating ordered by `created_at`.
    async fn history_for_rating(
        &self,
        rating_id: RatingId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError>;
    async fn history_for_game(
        &self,
        game_id: GameId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError>;
    async fn insert_history_event(
        &self,
        event: &NewHistoryEvent,
    ) -> Result<RatingHistoryEvent, RatingError>;
    async fn delete_history_for_rating(&self, rating_id: RatingId) -> Result<u64, RatingError>;
}

#[derive(Debug, Default)]
struct Tables {
    games: HashMap<GameId, Game>,
    results: BTreeMap<i64, GameResult>,
    ratings: BTreeMap<RatingId, Rating>,
    history: BTreeMap<i64, RatingHistoryEvent>,
    next_result_id: i64,
    next_rating_id: RatingId,
    next_event_id: i64,
}

fn sort_history(events: &mut [RatingHistoryEvent]) {
    events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// In-memory implementation of RatingStore for development and testing.
///
/// Also accepts games and results, which the engine itself only ever reads.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRatingStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_game(&self, game: Game) {
        let mut tables = self.tables.write().await;
        tables.games.insert(game.id, game);
    }

    pub async fn add_result(&self, result: NewGameResult) -> GameResult {
        let mut tables = self.tables.write().await;
        tables.next_result_id += 1;
        let stored = GameResult {
            id: tables.next_result_id,
            game_id: result.game_id,
            created_at: result.created_at,
            teams: result.teams,
        };
        tables.results.insert(stored.id, stored.clone());
        debug!(
            result_id = stored.id,
            game_id = stored.game_id,
            "Result stored in memory"
        );
        stored
    }

    pub async fn rating_count(&self) -> usize {
        self.tables.read().await.ratings.len()
    }

    pub async fn history_count(&self) -> usize {
        self.tables.read().await.history.len()
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, RatingError> {
        Ok(self.tables.read().await.games.get(&game_id).cloned())
    }

    async fn results_for_game(&self, game_id: GameId) -> Result<Vec<GameResult>, RatingError> {
        let tables = self.tables.read().await;
        let mut results: Vec<GameResult> = tables
            .results
            .values()
            .filter(|r| r.game_id == game_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(results)
    }

    async fn ratings_for_game(&self, game_id: GameId) -> Result<Vec<Rating>, RatingError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ratings
            .values()
            .filter(|r| r.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn ratings_for_players(
        &self,
        game_id: GameId,
        player_ids: &[PlayerId],
    ) -> Result<Vec<Rating>, RatingError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ratings
            .values()
            .filter(|r| r.game_id == game_id && player_ids.contains(&r.player_id))
            .cloned()
            .collect())
    }

    async fn ratings_for_player(&self, player_id: PlayerId) -> Result<Vec<Rating>, RatingError> {
        let tables = self.tables.read().await;
        let mut ratings: Vec<Rating> = tables
            .ratings
            .values()
            .filter(|r| r.player_id == player_id)
            .cloned()
            .collect();
        ratings.sort_by(|a, b| b.value.cmp(&a.value).then(a.game_id.cmp(&b.game_id)));
        Ok(ratings)
    }

    async fn find_rating(
        &self,
        player_id: PlayerId,
        game_id: GameId,
    ) -> Result<Option<Rating>, RatingError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ratings
            .values()
            .find(|r| r.player_id == player_id && r.game_id == game_id)
            .cloned())
    }

    #[instrument(skip(self, rating))]
    async fn insert_rating(&self, rating: &NewRating) -> Result<Rating, RatingError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .ratings
            .values()
            .find(|r| r.player_id == rating.player_id && r.game_id == rating.game_id)
        {
            debug!(rating_id = existing.id, "Rating already exists in memory");
            return Ok(existing.clone());
        }

        tables.next_rating_id += 1;
        let stored = Rating {
            id: tables.next_rating_id,
            player_id: rating.player_id,
            game_id: rating.game_id,
            value: rating.value,
            mean: rating.mean,
            deviation: rating.deviation,
        };
        tables.ratings.insert(stored.id, stored.clone());

        debug!(
            rating_id = stored.id,
            player_id = stored.player_id,
            "Rating created in memory"
        );
        Ok(stored)
    }

    #[instrument(skip(self, rating))]
    async fn update_rating(&self, rating: &Rating) -> Result<(), RatingError> {
        let mut tables = self.tables.write().await;
        match tables.ratings.get_mut(&rating.id) {
            Some(stored) => {
                *stored = rating.clone();
                Ok(())
            }
            None => {
                warn!(
                    rating_id = rating.id,
                    "Rating not found for update in memory"
                );
                Err(RatingError::Store(format!("rating {} not found", rating.id)))
            }
        }
    }

    async fn history_for_rating(
        &self,
        rating_id: RatingId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError> {
        let tables = self.tables.read().await;
        let mut events: Vec<RatingHistoryEvent> = tables
            .history
            .values()
            .filter(|e| e.rating_id == rating_id)
            .cloned()
            .collect();
        sort_history(&mut events);
        Ok(events)
    }

    async fn history_for_game(
        &self,
        game_id: GameId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError> {
        let tables = self.tables.read().await;
        let mut events: Vec<RatingHistoryEvent> = tables
            .history
            .values()
            .filter(|e| {
                tables
                    .ratings
                    .get(&e.rating_id)
                    .is_some_and(|r| r.game_id == game_id)
            })
            .cloned()
            .collect();
        sort_history(&mut events);
        Ok(events)
    }

    async fn insert_history_event(
        &self,
        event: &NewHistoryEvent,
    ) -> Result<RatingHistoryEvent, RatingError> {
        let mut tables = self.tables.write().await;
        if !tables.ratings.contains_key(&event.rating_id) {
            warn!(
                rating_id = event.rating_id,
                "History event for unknown rating"
            );
            return Err(RatingError::Store(format!(
                "rating {} not found",
                event.rating_id
            )));
        }

        tables.next_event_id += 1;
        let stored = RatingHistoryEvent {
            id: tables.next_event_id,
            rating_id: event.rating_id,
            value: event.value,
            mean: event.mean,
            deviation: event.deviation,
            created_at: event.created_at,
        };
        tables.history.insert(stored.id, stored.clone());
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn delete_history_for_rating(&self, rating_id: RatingId) -> Result<u64, RatingError> {
        let mut tables = self.tables.write().await;
        let before = tables.history.len();
        tables.history.retain(|_, e| e.rating_id != rating_id);
        let removed = (before - tables.history.len()) as u64;
        debug!(rating_id, removed, "History deleted from memory");
        Ok(removed)
    }
}
