pub mod calculators;
pub mod history;
pub mod postgres;
pub mod processor;
pub mod recalculator;
pub mod reconciler;
pub mod service;
pub mod validation;

mod errors;
pub mod models;
pub mod repository;

#[cfg(test)]
pub mod test_utils;

pub use errors::RatingError;
pub use history::{build_timeline, TimelinePoint};
pub use models::*;
pub use postgres::PostgresRatingStore;
pub use processor::{ProcessedResult, ProcessingReport, ResultProcessor};
pub use recalculator::{RatingRecalculator, RecalculationReport};
pub use reconciler::{RatingReconciler, ReconcileOutcome};
pub use repository::{InMemoryRatingStore, RatingStore};
pub use service::{LeaderboardEntry, PlayerGameRating, RatingService, RatingServiceBuilder};
pub use validation::{validate_game, validate_result};

use std::collections::BTreeMap;

/// A rating model: decides which results it can rate and computes new
/// ratings from the participants' priors.
///
/// Implementations are pure; persistence happens in [`ResultProcessor`].
pub trait RatingCalculator: Send + Sync {
    fn model(&self) -> RatingModel;

    /// Rejects results whose teams the model cannot rate with
    /// [`RatingError::ShapeViolation`].
    fn check_shape(&self, result: &GameResult) -> Result<(), RatingError>;

    /// New rating for every participant. `priors` holds an entry for each of
    /// them.
    fn calculate(
        &self,
        result: &GameResult,
        priors: &BTreeMap<PlayerId, PriorRating>,
    ) -> Result<BTreeMap<PlayerId, RatingUpdate>, RatingError>;
}
