// Library crate for the Elovation rating engine

pub mod config;
pub mod rating;

pub use config::EngineConfig;
pub use rating::{
    GameResult, InMemoryRatingStore, PostgresRatingStore, ProcessingReport, RatingError,
    RatingService, RatingStore, RecalculationReport,
};
