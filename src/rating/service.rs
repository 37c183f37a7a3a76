use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;

use super::{
    build_timeline, calculators::DEFAULT_K_FACTOR, validate_result, Game, GameId, GameResult,
    PlayerId, ProcessingReport, Rating, RatingCalculator, RatingError, RatingHistoryEvent,
    RatingId, RatingRecalculator, RatingReconciler, RatingStore, RecalculationReport,
    ResultProcessor, Team, TimelinePoint, DEFAULT_RATING_VALUE,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based.
    pub position: usize,
    pub player_id: PlayerId,
    pub player_name: Option<String>,
    pub rating: Rating,
}

/// One of a player's ratings together with the game it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerGameRating {
    pub game_id: GameId,
    /// None when the game row is gone.
    pub game_name: Option<String>,
    pub rating: Rating,
}

/// Entry point for everything that changes or reads ratings of a game.
///
/// Incremental updates and recalculations of the same game are serialized;
/// different games proceed independently.
pub struct RatingService {
    store: Arc<dyn RatingStore>,
    reconciler: RatingReconciler,
    processor: Arc<ResultProcessor>,
    recalculator: RatingRecalculator,
    game_mutexes: Arc<RwLock<HashMap<GameId, Arc<AsyncMutex<()>>>>>,
}

impl RatingService {
    pub fn builder(store: Arc<dyn RatingStore>) -> RatingServiceBuilder {
        RatingServiceBuilder::new(store)
    }

    async fn load_game(&self, game_id: GameId) -> Result<Game, RatingError> {
        self.store
            .get_game(game_id)
            .await?
            .ok_or_else(|| RatingError::NotFound(format!("game {game_id}")))
    }

    /// Applies a newly recorded result to the current ratings, creating
    /// default ratings for first-time participants.
    ///
    /// Errors only when the game cannot be loaded; everything that goes wrong
    /// per player ends up in the report.
    #[instrument(skip(self, result), fields(result_id = result.id))]
    pub async fn record_result(
        &self,
        game_id: GameId,
        result: &GameResult,
    ) -> Result<ProcessingReport, RatingError> {
        if result.game_id != game_id {
            return Err(RatingError::Validation(format!(
                "Result {} belongs to game {}, not {game_id}",
                result.id, result.game_id
            )));
        }
        let game = self.load_game(game_id).await?;

        let game_lock = self.game_lock(game_id).await;
        let _guard = game_lock.lock().await;

        let roster: BTreeSet<PlayerId> = result.player_ids();
        let player_ids: Vec<PlayerId> = roster.iter().copied().collect();
        let existing = self
            .store
            .ratings_for_players(game_id, &player_ids)
            .await?
            .into_iter()
            .map(|r| (r.player_id, r))
            .collect();

        let reconciled = self
            .reconciler
            .ensure_ratings(game_id, &roster, existing)
            .await;
        let processed = self
            .processor
            .process_result(result, game.rating_model, reconciled.all)
            .await;

        let mut report = processed.report;
        if !reconciled.failures.is_empty() {
            let mut warnings = reconciled.failures;
            warnings.append(&mut report.warnings);
            report.warnings = warnings;
        }

        info!(
            game_id,
            created = reconciled.created.len(),
            updated = report.updated.len(),
            skipped = report.skipped,
            "Recorded result"
        );
        Ok(report)
    }

    /// Rebuilds the game's ratings and history from scratch.
    pub async fn recalculate_game(
        &self,
        game_id: GameId,
    ) -> Result<RecalculationReport, RatingError> {
        let game_lock = self.game_lock(game_id).await;
        let _guard = game_lock.lock().await;

        self.recalculator.recalculate_game(game_id).await
    }

    /// Validates teams about to be recorded for a game.
    pub async fn validate_result(
        &self,
        game_id: GameId,
        teams: &[Team],
    ) -> Result<(), RatingError> {
        let game = self.load_game(game_id).await?;
        validate_result(&game, teams)
    }

    #[instrument(skip(self))]
    pub async fn leaderboard(&self, game_id: GameId) -> Result<Vec<LeaderboardEntry>, RatingError> {
        self.load_game(game_id).await?;

        let mut ratings = self.store.ratings_for_game(game_id).await?;
        ratings.sort_by(|a, b| b.value.cmp(&a.value).then(a.player_id.cmp(&b.player_id)));

        let names: HashMap<PlayerId, String> = self
            .store
            .results_for_game(game_id)
            .await?
            .into_iter()
            .flat_map(|r| r.teams)
            .flat_map(|t| t.players)
            .map(|p| (p.id, p.name))
            .collect();

        Ok(ratings
            .into_iter()
            .enumerate()
            .map(|(index, rating)| LeaderboardEntry {
                position: index + 1,
                player_id: rating.player_id,
                player_name: names.get(&rating.player_id).cloned(),
                rating,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn rating_timeline(
        &self,
        game_id: GameId,
    ) -> Result<Vec<TimelinePoint>, RatingError> {
        self.load_game(game_id).await?;

        let owners: HashMap<RatingId, PlayerId> = self
            .store
            .ratings_for_game(game_id)
            .await?
            .into_iter()
            .map(|r| (r.id, r.player_id))
            .collect();
        let events = self.store.history_for_game(game_id).await?;

        Ok(build_timeline(&events, &owners))
    }

    /// Every rating the player holds across games, highest value first.
    #[instrument(skip(self))]
    pub async fn player_ratings(
        &self,
        player_id: PlayerId,
    ) -> Result<Vec<PlayerGameRating>, RatingError> {
        let ratings = self.store.ratings_for_player(player_id).await?;
        let games = join_all(ratings.iter().map(|r| self.store.get_game(r.game_id))).await;

        let mut entries = Vec::with_capacity(ratings.len());
        for (rating, game) in ratings.into_iter().zip(games) {
            entries.push(PlayerGameRating {
                game_id: rating.game_id,
                game_name: game?.map(|g| g.name),
                rating,
            });
        }
        debug!(player_id, games = entries.len(), "Loaded player ratings");
        Ok(entries)
    }

    /// True when stored ratings no longer match what the history says: a
    /// participant has no rating, a rating's latest event disagrees with its
    /// value, or a rating moved off the default without any history.
    #[instrument(skip(self))]
    pub async fn needs_recalculation(&self, game_id: GameId) -> Result<bool, RatingError> {
        self.load_game(game_id).await?;

        let results = self.store.results_for_game(game_id).await?;
        if results.is_empty() {
            return Ok(false);
        }

        let roster: BTreeSet<PlayerId> = results.iter().flat_map(|r| r.player_ids()).collect();
        let ratings = self.store.ratings_for_game(game_id).await?;
        let rated: BTreeSet<PlayerId> = ratings.iter().map(|r| r.player_id).collect();
        if let Some(player_id) = roster.difference(&rated).next() {
            debug!(game_id, player_id, "Participant without rating");
            return Ok(true);
        }

        let mut latest: HashMap<RatingId, &RatingHistoryEvent> = HashMap::new();
        let events = self.store.history_for_game(game_id).await?;
        for event in &events {
            let newer = latest.get(&event.rating_id).map_or(true, |current| {
                (event.created_at, event.id) >= (current.created_at, current.id)
            });
            if newer {
                latest.insert(event.rating_id, event);
            }
        }

        for rating in &ratings {
            let stale = match latest.get(&rating.id) {
                Some(event) => event.value != rating.value,
                None => rating.value != DEFAULT_RATING_VALUE,
            };
            if stale {
                debug!(
                    game_id,
                    rating_id = rating.id,
                    "Rating disagrees with history"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn game_lock(&self, game_id: GameId) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.game_mutexes.read().await;
            if let Some(lock) = guard.get(&game_id) {
                return lock.clone();
            }
        }

        let mut guard = self.game_mutexes.write().await;
        guard
            .entry(game_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

pub struct RatingServiceBuilder {
    store: Arc<dyn RatingStore>,
    k_factor: f64,
    calculators: Vec<Arc<dyn RatingCalculator>>,
}

impl RatingServiceBuilder {
    fn new(store: Arc<dyn RatingStore>) -> Self {
        Self {
            store,
            k_factor: DEFAULT_K_FACTOR,
            calculators: Vec::new(),
        }
    }

    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_k_factor(config.k_factor)
    }

    pub fn with_k_factor(mut self, k_factor: f64) -> Self {
        self.k_factor = k_factor;
        self
    }

    /// Replaces the built-in calculator for the calculator's model.
    pub fn with_calculator(mut self, calculator: Arc<dyn RatingCalculator>) -> Self {
        self.calculators.push(calculator);
        self
    }

    pub fn build(self) -> RatingService {
        let processor = self
            .calculators
            .into_iter()
            .fold(
                ResultProcessor::with_k_factor(self.store.clone(), self.k_factor),
                ResultProcessor::with_calculator,
            );
        let processor = Arc::new(processor);

        RatingService {
            reconciler: RatingReconciler::new(self.store.clone()),
            recalculator: RatingRecalculator::new(self.store.clone(), processor.clone()),
            processor,
            store: self.store,
            game_mutexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
