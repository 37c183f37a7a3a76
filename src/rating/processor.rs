use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::{
    calculators::{EloCalculator, TeamRatingCalculator, DEFAULT_K_FACTOR},
    GameResult, NewHistoryEvent, PlayerId, PriorRating, Rating, RatingCalculator, RatingError,
    RatingHistoryEvent, RatingMap, RatingModel, RatingStore, ResultId,
};

/// What happened to one result. Warnings never undo the result itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub result_id: ResultId,
    /// The result was not applied at all (shape violation or no calculator).
    pub skipped: bool,
    /// Players whose rating row was written.
    pub updated: Vec<PlayerId>,
    pub warnings: Vec<RatingError>,
}

impl ProcessingReport {
    fn new(result_id: ResultId) -> Self {
        Self {
            result_id,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.skipped && self.warnings.is_empty()
    }

    pub fn store_failures(&self) -> impl Iterator<Item = &RatingError> {
        self.warnings.iter().filter(|w| w.is_store_failure())
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedResult {
    /// The input map with every persisted update applied. A player whose
    /// rating write failed keeps their prior.
    pub ratings: RatingMap,
    /// History events that made it into the store, in player order.
    pub history: Vec<RatingHistoryEvent>,
    pub report: ProcessingReport,
}

enum PlayerOutcome {
    Applied(RatingHistoryEvent),
    HistoryFailed(RatingError),
    UpdateFailed(RatingError),
}

/// Applies one result to the ratings of its participants.
pub struct ResultProcessor {
    store: Arc<dyn RatingStore>,
    calculators: Vec<Arc<dyn RatingCalculator>>,
}

impl ResultProcessor {
    pub fn new(store: Arc<dyn RatingStore>) -> Self {
        Self::with_k_factor(store, DEFAULT_K_FACTOR)
    }

    pub fn with_k_factor(store: Arc<dyn RatingStore>, k_factor: f64) -> Self {
        Self {
            store,
            calculators: vec![
                Arc::new(EloCalculator::new(k_factor)),
                Arc::new(TeamRatingCalculator::new()),
            ],
        }
    }

    /// Replaces the calculator registered for the same model.
    pub fn with_calculator(mut self, calculator: Arc<dyn RatingCalculator>) -> Self {
        let model = calculator.model();
        self.calculators.retain(|c| c.model() != model);
        self.calculators.push(calculator);
        self
    }

    fn calculator_for(&self, model: RatingModel) -> Option<&Arc<dyn RatingCalculator>> {
        self.calculators.iter().find(|c| c.model() == model)
    }

    /// Drops playerless teams, validates the shape, computes the new ratings with the model's
    /// calculator, writes every changed rating and appends one history event
    /// per written rating stamped with the result's own timestamp.
    ///
    /// Per-player store failures are reported and the remaining players are
    /// still written.
    #[instrument(skip(self, result, ratings), fields(result_id = result.id))]
    pub async fn process_result(
        &self,
        result: &GameResult,
        model: RatingModel,
        mut ratings: RatingMap,
    ) -> ProcessedResult {
        let mut report = ProcessingReport::new(result.id);

        let Some(calculator) = self.calculator_for(model) else {
            error!(%model, "No calculator registered for rating model");
            report.skipped = true;
            report
                .warnings
                .push(RatingError::NotFound(format!("calculator for {model}")));
            return ProcessedResult {
                ratings,
                history: Vec::new(),
                report,
            };
        };

        let result = result.without_empty_teams();
        let result: &GameResult = &result;

        if let Err(err) = calculator.check_shape(result) {
            warn!(%err, "Skipping result with unsupported shape");
            report.skipped = true;
            report.warnings.push(err);
            return ProcessedResult {
                ratings,
                history: Vec::new(),
                report,
            };
        }

        let mut priors: BTreeMap<PlayerId, PriorRating> = BTreeMap::new();
        for player_id in result.player_ids() {
            let prior = match ratings.get(&player_id) {
                Some(rating) => PriorRating::from(rating),
                None => {
                    error!(
                        player_id,
                        "No rating for participant, computing with defaults"
                    );
                    report
                        .warnings
                        .push(RatingError::MissingRatingData { player_id });
                    PriorRating::default()
                }
            };
            priors.insert(player_id, prior);
        }

        let updates = match calculator.calculate(result, &priors) {
            Ok(updates) => updates,
            Err(err) => {
                warn!(%err, "Calculator rejected result");
                report.skipped = true;
                report.warnings.push(err);
                return ProcessedResult {
                    ratings,
                    history: Vec::new(),
                    report,
                };
            }
        };

        // Participants without a rating row have nothing to write to.
        let pending: Vec<Rating> = updates
            .iter()
            .filter_map(|(player_id, update)| {
                let mut rating = ratings.get(player_id)?.clone();
                rating.apply(update);
                Some(rating)
            })
            .collect();

        let outcomes = join_all(
            pending
                .iter()
                .map(|rating| self.persist(rating, model, result.created_at)),
        )
        .await;

        let mut history = Vec::with_capacity(pending.len());
        for (rating, outcome) in pending.into_iter().zip(outcomes) {
            match outcome {
                PlayerOutcome::Applied(event) => {
                    report.updated.push(rating.player_id);
                    history.push(event);
                }
                PlayerOutcome::HistoryFailed(err) => {
                    report.updated.push(rating.player_id);
                    report.warnings.push(err);
                }
                PlayerOutcome::UpdateFailed(err) => {
                    report.warnings.push(err);
                    continue;
                }
            }
            ratings.insert(rating.player_id, rating);
        }

        debug!(
            updated = report.updated.len(),
            warnings = report.warnings.len(),
            "Result processed"
        );

        ProcessedResult {
            ratings,
            history,
            report,
        }
    }

    async fn persist(
        &self,
        rating: &Rating,
        model: RatingModel,
        created_at: DateTime<Utc>,
    ) -> PlayerOutcome {
        if let Err(err) = self.store.update_rating(rating).await {
            warn!(
                %err,
                player_id = rating.player_id,
                rating_id = rating.id,
                "Failed to update rating"
            );
            return PlayerOutcome::UpdateFailed(err);
        }

        let event = NewHistoryEvent::for_rating(rating, model, created_at);
        match self.store.insert_history_event(&event).await {
            Ok(stored) => PlayerOutcome::Applied(stored),
            Err(err) => {
                warn!(
                    %err,
                    player_id = rating.player_id,
                    rating_id = rating.id,
                    "Failed to append rating history"
                );
                PlayerOutcome::HistoryFailed(err)
            }
        }
    }
}
