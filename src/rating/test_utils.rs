use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use super::{
    Game, GameId, GameResult, InMemoryRatingStore, NewHistoryEvent, NewRating, Player, PlayerId,
    Rating, RatingError, RatingHistoryEvent, RatingId, RatingStore, Team,
};

/// Noon UTC on the given day of January 2024.
pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 12, 0, 0).unwrap()
}

pub fn team(rank: u32, ids: &[PlayerId]) -> Team {
    Team::new(
        rank,
        ids.iter()
            .map(|id| Player::new(*id, format!("player-{id}")))
            .collect(),
    )
}

pub fn result(
    id: i64,
    game_id: GameId,
    created_at: DateTime<Utc>,
    teams: Vec<Team>,
) -> GameResult {
    GameResult {
        id,
        game_id,
        created_at,
        teams,
    }
}

/// In-memory store that fails selected writes for selected players.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryRatingStore,
    refuse_insert: Mutex<HashSet<PlayerId>>,
    refuse_update: Mutex<HashSet<PlayerId>>,
    refuse_history: Mutex<HashSet<RatingId>>,
    refuse_delete: Mutex<HashSet<RatingId>>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryRatingStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn refuse_insert_for(&self, player_id: PlayerId) {
        self.refuse_insert.lock().unwrap().insert(player_id);
    }

    pub fn refuse_update_for(&self, player_id: PlayerId) {
        self.refuse_update.lock().unwrap().insert(player_id);
    }

    pub fn refuse_history_for(&self, rating_id: RatingId) {
        self.refuse_history.lock().unwrap().insert(rating_id);
    }

    pub fn refuse_delete_for(&self, rating_id: RatingId) {
        self.refuse_delete.lock().unwrap().insert(rating_id);
    }

    pub fn heal(&self) {
        self.refuse_insert.lock().unwrap().clear();
        self.refuse_update.lock().unwrap().clear();
        self.refuse_history.lock().unwrap().clear();
        self.refuse_delete.lock().unwrap().clear();
    }

    fn refused(&self, set: &Mutex<HashSet<i64>>, id: i64, what: &str) -> Result<(), RatingError> {
        if set.lock().unwrap().contains(&id) {
            return Err(RatingError::Store(format!("{what} refused for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RatingStore for FlakyStore {
    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, RatingError> {
        self.inner.get_game(game_id).await
    }

    async fn results_for_game(&self, game_id: GameId) -> Result<Vec<GameResult>, RatingError> {
        self.inner.results_for_game(game_id).await
    }

    async fn ratings_for_game(&self, game_id: GameId) -> Result<Vec<Rating>, RatingError> {
        self.inner.ratings_for_game(game_id).await
    }

    async fn ratings_for_players(
        &self,
        game_id: GameId,
        player_ids: &[PlayerId],
    ) -> Result<Vec<Rating>, RatingError> {
        self.inner.ratings_for_players(game_id, player_ids).await
    }

    async fn ratings_for_player(&self, player_id: PlayerId) -> Result<Vec<Rating>, RatingError> {
        self.inner.ratings_for_player(player_id).await
    }

    async fn find_rating(
        &self,
        player_id: PlayerId,
        game_id: GameId,
    ) -> Result<Option<Rating>, RatingError> {
        self.inner.find_rating(player_id, game_id).await
    }

    async fn insert_rating(&self, rating: &NewRating) -> Result<Rating, RatingError> {
        self.refused(&self.refuse_insert, rating.player_id, "insert")?;
        self.inner.insert_rating(rating).await
    }

    async fn update_rating(&self, rating: &Rating) -> Result<(), RatingError> {
        self.refused(&self.refuse_update, rating.player_id, "update")?;
        self.inner.update_rating(rating).await
    }

    async fn history_for_rating(
        &self,
        rating_id: RatingId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError> {
        self.inner.history_for_rating(rating_id).await
    }

    async fn history_for_game(
        &self,
        game_id: GameId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError> {
        self.inner.history_for_game(game_id).await
    }

    async fn insert_history_event(
        &self,
        event: &NewHistoryEvent,
    ) -> Result<RatingHistoryEvent, RatingError> {
        self.refused(&self.refuse_history, event.rating_id, "history insert")?;
        self.inner.insert_history_event(event).await
    }

    async fn delete_history_for_rating(&self, rating_id: RatingId) -> Result<u64, RatingError> {
        self.refused(&self.refuse_delete, rating_id, "history delete")?;
        self.inner.delete_history_for_rating(rating_id).await
    }
}
