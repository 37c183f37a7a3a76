use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::{
    GameId, PlayerId, Rating, RatingError, RatingMap, RatingReconciler, RatingStore,
    ResultProcessor,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecalculationReport {
    pub game_id: GameId,
    pub results_replayed: usize,
    pub results_skipped: usize,
    pub ratings_created: usize,
    pub history_deleted: u64,
    pub history_written: usize,
    /// Final ratings ordered by player id.
    pub ratings: Vec<Rating>,
    /// Non-fatal findings such as skipped results.
    pub warnings: Vec<RatingError>,
}

/// Rebuilds a game's ratings and history from its recorded results.
pub struct RatingRecalculator {
    store: Arc<dyn RatingStore>,
    reconciler: RatingReconciler,
    processor: Arc<ResultProcessor>,
}

impl RatingRecalculator {
    pub fn new(store: Arc<dyn RatingStore>, processor: Arc<ResultProcessor>) -> Self {
        Self {
            reconciler: RatingReconciler::new(store.clone()),
            store,
            processor,
        }
    }

    /// Wipes the history of every rating of the game, resets the ratings to
    /// their defaults and replays all results oldest first.
    ///
    /// Failing to load the inputs leaves everything untouched and is returned
    /// as is. Once history deletion has started, every store failure is
    /// collected and the whole run is reported as
    /// [`RatingError::RecalculationInconsistency`]; running it again is safe
    /// because results are never modified.
    #[instrument(skip(self))]
    pub async fn recalculate_game(
        &self,
        game_id: GameId,
    ) -> Result<RecalculationReport, RatingError> {
        let game = self
            .store
            .get_game(game_id)
            .await?
            .ok_or_else(|| RatingError::NotFound(format!("game {game_id}")))?;

        let mut results = self.store.results_for_game(game_id).await?;
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let roster: BTreeSet<PlayerId> = results.iter().flat_map(|r| r.player_ids()).collect();
        let existing: RatingMap = self
            .store
            .ratings_for_game(game_id)
            .await?
            .into_iter()
            .map(|r| (r.player_id, r))
            .collect();

        info!(
            game_id,
            model = %game.rating_model,
            results = results.len(),
            players = roster.len(),
            "Recalculating ratings"
        );

        let mut report = RecalculationReport {
            game_id,
            ..RecalculationReport::default()
        };

        let reconciled = self
            .reconciler
            .ensure_ratings(game_id, &roster, existing)
            .await;
        report.ratings_created = reconciled.created.len();
        let mut failures = reconciled.failures;
        let mut ratings = reconciled.all;

        for rating in ratings.values_mut() {
            match self.store.delete_history_for_rating(rating.id).await {
                Ok(deleted) => report.history_deleted += deleted,
                Err(err) => {
                    warn!(%err, rating_id = rating.id, "Failed to delete rating history");
                    failures.push(err);
                }
            }

            rating.reset_to_default();
            if let Err(err) = self.store.update_rating(rating).await {
                warn!(%err, rating_id = rating.id, "Failed to reset rating");
                failures.push(err);
            }
        }

        for result in &results {
            let processed = self
                .processor
                .process_result(result, game.rating_model, ratings)
                .await;
            ratings = processed.ratings;

            if processed.report.skipped {
                report.results_skipped += 1;
            } else {
                report.results_replayed += 1;
            }
            report.history_written += processed.history.len();

            for warning in processed.report.warnings {
                if warning.is_store_failure() {
                    failures.push(warning);
                } else {
                    report.warnings.push(warning);
                }
            }
        }

        report.ratings = ratings.into_values().collect();

        if !failures.is_empty() {
            error!(
                game_id,
                failures = failures.len(),
                "Recalculation left ratings inconsistent with results"
            );
            return Err(RatingError::RecalculationInconsistency { game_id, failures });
        }

        info!(
            game_id,
            replayed = report.results_replayed,
            skipped = report.results_skipped,
            "Recalculation finished"
        );
        Ok(report)
    }
}
