#![allow(dead_code)]

use std::sync::Arc;

use elovation::rating::{Game, NewGameResult, Rating, RatingStore};
use elovation::{GameResult, InMemoryRatingStore, ProcessingReport, RatingService};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub const ELO_GAME: i64 = 1;
pub const TEAM_GAME: i64 = 2;

pub struct TestSetup {
    pub store: Arc<InMemoryRatingStore>,
    pub service: RatingService,
}

pub struct TestSetupBuilder {
    games: Vec<Game>,
    k_factor: Option<f64>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            games: vec![],
            k_factor: None,
        }
    }

    pub fn with_game(mut self, game: Game) -> Self {
        self.games.push(game);
        self
    }

    /// Chess-like one-on-one game under `ELO_GAME`.
    pub fn with_elo_game(self) -> Self {
        self.with_game(Game::new_elo(ELO_GAME, "chess", false))
    }

    /// Free-for-all team game under `TEAM_GAME`.
    pub fn with_team_game(self) -> Self {
        self.with_game(Game::new_team_rating(TEAM_GAME, "foosball", true))
    }

    pub fn with_k_factor(mut self, k_factor: f64) -> Self {
        self.k_factor = Some(k_factor);
        self
    }

    pub async fn build(self) -> TestSetup {
        let store = Arc::new(InMemoryRatingStore::new());
        for game in self.games {
            store.add_game(game).await;
        }

        let mut builder = RatingService::builder(store.clone());
        if let Some(k_factor) = self.k_factor {
            builder = builder.with_k_factor(k_factor);
        }

        TestSetup {
            store,
            service: builder.build(),
        }
    }
}

impl TestSetup {
    /// Stores a result without rating it, as an import or a crashed write would.
    pub async fn store_only(&self, result: NewGameResult) -> GameResult {
        self.store.add_result(result).await
    }

    /// Stores a result and runs the incremental rating update for it.
    pub async fn submit(&self, result: NewGameResult) -> ProcessingReport {
        let game_id = result.game_id;
        let stored = self.store.add_result(result).await;
        self.service
            .record_result(game_id, &stored)
            .await
            .expect("recording a result should succeed")
    }

    pub async fn rating(&self, game_id: i64, player_id: i64) -> Rating {
        self.store
            .find_rating(player_id, game_id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("player {player_id} should have a rating in game {game_id}"))
    }

    pub async fn value(&self, game_id: i64, player_id: i64) -> i32 {
        self.rating(game_id, player_id).await.value
    }
}
