//! Configuration system for chaetra.
//!
//! A [`LearningConfig`] is built once at startup, validated, and shared by
//! `Arc` with the store, engines and sweeper.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ChaetraError, ChaetraResult};
use crate::types::Tier;

/// Longest accepted short-term TTL: one hundred years.
pub const MAX_SHORT_TERM_TTL_SECONDS: i64 = 100 * 365 * 86_400;

/// Tier multipliers used when aggregating items into an opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpinionWeights {
    /// Weight of `Core` items.
    pub core: f64,
    /// Weight of `ShortTerm` items.
    pub short_term: f64,
    /// Weight of `Archived` items (only used when `include_archived` is set).
    pub archived: f64,
    /// Whether archived items take part in aggregation at all.
    pub include_archived: bool,
}

impl Default for OpinionWeights {
    fn default() -> Self {
        Self {
            core: 1.0,
            short_term: 0.5,
            archived: 0.25,
            include_archived: false,
        }
    }
}

impl OpinionWeights {
    /// Multiplier for a tier, or `None` if items in that tier are left out.
    pub fn multiplier(&self, tier: Tier) -> Option<f64> {
        match tier {
            Tier::Core => Some(self.core),
            Tier::ShortTerm => Some(self.short_term),
            Tier::Archived if self.include_archived => Some(self.archived),
            Tier::Archived | Tier::Removed => None,
        }
    }
}

/// Learning configuration shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Seconds a `ShortTerm` item may go without evidence before it expires.
    pub short_term_ttl_seconds: i64,
    /// Confidence needed for promotion to `Core`.
    pub core_confidence_threshold: f64,
    /// `Core` items at or below this confidence are archived.
    pub archive_confidence_threshold: f64,
    /// Corroborating evidence events needed for promotion to `Core`.
    pub min_validations_for_core: u32,
    /// Confidence delta per unit of evidence weight.
    pub validation_confidence_boost: f64,
    /// Aggregate confidence needed for an opinion to be stored.
    pub opinion_min_confidence_to_store: f64,
    /// Confidence assigned to a freshly created hypothesis.
    pub hypothesis_initial_confidence: f64,
    /// Interval between sweeper ticks.
    pub sweep_interval_seconds: u64,
    /// Contradictions pushing confidence below this unlearn the item.
    ///
    /// Defaults to the archive threshold when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlearn_confidence_threshold: Option<f64>,
    /// Whether a contradicted `Core` item is archived rather than removed.
    pub archive_contradicted_core: bool,
    /// Bounded wait for the per-item lock, in milliseconds.
    pub mutation_timeout_ms: u64,
    /// Opinion aggregation weights.
    pub opinion_weights: OpinionWeights,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            short_term_ttl_seconds: 86_400,
            core_confidence_threshold: 0.8,
            archive_confidence_threshold: 0.3,
            min_validations_for_core: 3,
            validation_confidence_boost: 0.1,
            opinion_min_confidence_to_store: 0.6,
            hypothesis_initial_confidence: 0.7,
            sweep_interval_seconds: 300,
            unlearn_confidence_threshold: None,
            archive_contradicted_core: true,
            mutation_timeout_ms: 250,
            opinion_weights: OpinionWeights::default(),
        }
    }
}

impl LearningConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    ///
    /// The loaded configuration is validated before it is returned.
    pub fn from_file(path: impl AsRef<Path>) -> ChaetraResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ChaetraError::configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ChaetraError::configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| ChaetraError::configuration(e.to_string()))?,
            _ => {
                return Err(ChaetraError::configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml",
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `CHAETRA_MEMORY_SHORT_TERM_TTL_SECONDS`
    /// - `CHAETRA_MEMORY_CORE_CONFIDENCE_THRESHOLD`
    /// - `CHAETRA_MEMORY_ARCHIVE_CONFIDENCE_THRESHOLD`
    /// - `CHAETRA_LEARNING_MIN_VALIDATIONS_FOR_CORE`
    /// - `CHAETRA_MEMORY_VALIDATION_CONFIDENCE_BOOST`
    /// - `CHAETRA_OPINION_MIN_CONFIDENCE_TO_STORE`
    /// - `CHAETRA_REASONING_HYPOTHESIS_CONFIDENCE`
    /// - `CHAETRA_SWEEP_INTERVAL_SECONDS`
    /// - `CHAETRA_UNLEARN_CONFIDENCE_THRESHOLD`
    /// - `CHAETRA_MUTATION_TIMEOUT_MS`
    ///
    /// Unparseable values are a configuration error, not silently ignored.
    pub fn from_env() -> ChaetraResult<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse("CHAETRA_MEMORY_SHORT_TERM_TTL_SECONDS")? {
            config.short_term_ttl_seconds = v;
        }
        if let Some(v) = env_parse("CHAETRA_MEMORY_CORE_CONFIDENCE_THRESHOLD")? {
            config.core_confidence_threshold = v;
        }
        if let Some(v) = env_parse("CHAETRA_MEMORY_ARCHIVE_CONFIDENCE_THRESHOLD")? {
            config.archive_confidence_threshold = v;
        }
        if let Some(v) = env_parse("CHAETRA_LEARNING_MIN_VALIDATIONS_FOR_CORE")? {
            config.min_validations_for_core = v;
        }
        if let Some(v) = env_parse("CHAETRA_MEMORY_VALIDATION_CONFIDENCE_BOOST")? {
            config.validation_confidence_boost = v;
        }
        if let Some(v) = env_parse("CHAETRA_OPINION_MIN_CONFIDENCE_TO_STORE")? {
            config.opinion_min_confidence_to_store = v;
        }
        if let Some(v) = env_parse("CHAETRA_REASONING_HYPOTHESIS_CONFIDENCE")? {
            config.hypothesis_initial_confidence = v;
        }
        if let Some(v) = env_parse("CHAETRA_SWEEP_INTERVAL_SECONDS")? {
            config.sweep_interval_seconds = v;
        }
        if let Some(v) = env_parse("CHAETRA_UNLEARN_CONFIDENCE_THRESHOLD")? {
            config.unlearn_confidence_threshold = Some(v);
        }
        if let Some(v) = env_parse("CHAETRA_MUTATION_TIMEOUT_MS")? {
            config.mutation_timeout_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> LearningConfigBuilder {
        LearningConfigBuilder::default()
    }

    /// Check every threshold and duration.
    pub fn validate(&self) -> ChaetraResult<()> {
        let unit = [
            ("core_confidence_threshold", self.core_confidence_threshold),
            ("archive_confidence_threshold", self.archive_confidence_threshold),
            ("opinion_min_confidence_to_store", self.opinion_min_confidence_to_store),
            ("hypothesis_initial_confidence", self.hypothesis_initial_confidence),
            ("unlearn_confidence_threshold", self.unlearn_threshold()),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ChaetraError::configuration(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.archive_confidence_threshold >= self.core_confidence_threshold {
            return Err(ChaetraError::configuration(format!(
                "archive_confidence_threshold ({}) must be below core_confidence_threshold ({})",
                self.archive_confidence_threshold, self.core_confidence_threshold
            )));
        }
        if !(1..=MAX_SHORT_TERM_TTL_SECONDS).contains(&self.short_term_ttl_seconds) {
            return Err(ChaetraError::configuration(format!(
                "short_term_ttl_seconds must lie in [1, {}], got {}",
                MAX_SHORT_TERM_TTL_SECONDS, self.short_term_ttl_seconds
            )));
        }
        if !(self.validation_confidence_boost > 0.0 && self.validation_confidence_boost.is_finite())
        {
            return Err(ChaetraError::configuration(format!(
                "validation_confidence_boost must be positive, got {}",
                self.validation_confidence_boost
            )));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ChaetraError::configuration(
                "sweep_interval_seconds must be positive",
            ));
        }
        if self.mutation_timeout_ms == 0 {
            return Err(ChaetraError::configuration("mutation_timeout_ms must be positive"));
        }

        let w = &self.opinion_weights;
        if [w.core, w.short_term, w.archived]
            .iter()
            .any(|m| !(*m >= 0.0 && m.is_finite()))
        {
            return Err(ChaetraError::configuration(
                "opinion weights must be finite and non-negative",
            ));
        }

        Ok(())
    }

    /// Effective low-confidence threshold for contradiction handling.
    pub fn unlearn_threshold(&self) -> f64 {
        self.unlearn_confidence_threshold
            .unwrap_or(self.archive_confidence_threshold)
    }

    /// Short-term TTL as a chrono duration, saturated to the accepted range.
    pub fn short_term_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.short_term_ttl_seconds.clamp(0, MAX_SHORT_TERM_TTL_SECONDS))
    }

    /// Sweep interval as a std duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Bounded wait for the per-item lock.
    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> ChaetraResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ChaetraError::configuration(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

/// Builder for LearningConfig.
#[derive(Default)]
pub struct LearningConfigBuilder {
    config: LearningConfig,
}

impl LearningConfigBuilder {
    /// Set the short-term TTL in seconds.
    pub fn short_term_ttl_seconds(mut self, seconds: i64) -> Self {
        self.config.short_term_ttl_seconds = seconds;
        self
    }

    /// Set the promotion confidence threshold.
    pub fn core_confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.core_confidence_threshold = threshold;
        self
    }

    /// Set the archival confidence threshold.
    pub fn archive_confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.archive_confidence_threshold = threshold;
        self
    }

    /// Set the validations needed for promotion.
    pub fn min_validations_for_core(mut self, count: u32) -> Self {
        self.config.min_validations_for_core = count;
        self
    }

    /// Set the per-unit-weight confidence delta.
    pub fn validation_confidence_boost(mut self, boost: f64) -> Self {
        self.config.validation_confidence_boost = boost;
        self
    }

    /// Set the opinion store threshold.
    pub fn opinion_min_confidence_to_store(mut self, threshold: f64) -> Self {
        self.config.opinion_min_confidence_to_store = threshold;
        self
    }

    /// Set the initial confidence of new hypotheses.
    pub fn hypothesis_initial_confidence(mut self, confidence: f64) -> Self {
        self.config.hypothesis_initial_confidence = confidence;
        self
    }

    /// Set the sweep interval in seconds.
    pub fn sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.sweep_interval_seconds = seconds;
        self
    }

    /// Set an explicit unlearn threshold.
    pub fn unlearn_confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.unlearn_confidence_threshold = Some(threshold);
        self
    }

    /// Choose whether contradicted `Core` items are archived or removed.
    pub fn archive_contradicted_core(mut self, archive: bool) -> Self {
        self.config.archive_contradicted_core = archive;
        self
    }

    /// Set the per-item lock wait in milliseconds.
    pub fn mutation_timeout_ms(mut self, millis: u64) -> Self {
        self.config.mutation_timeout_ms = millis;
        self
    }

    /// Set the opinion weights.
    pub fn opinion_weights(mut self, weights: OpinionWeights) -> Self {
        self.config.opinion_weights = weights;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> ChaetraResult<LearningConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
