use crate::rating::calculators::DEFAULT_K_FACTOR;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub k_factor: f64,
    pub database_url: Option<String>,
}

impl EngineConfig {
    /// Reads `ELO_K_FACTOR` and `DATABASE_URL`; unparsable or non-positive
    /// k-factors fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let k_factor = lookup("ELO_K_FACTOR")
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|k| k.is_finite() && *k > 0.0)
            .unwrap_or(DEFAULT_K_FACTOR);

        Self {
            k_factor,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            database_url: None,
        }
    }
}
