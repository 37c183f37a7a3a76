pub mod assertions;
pub mod result_builders;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::RatingAssertion;
pub use result_builders::ResultBuilder;
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder};
