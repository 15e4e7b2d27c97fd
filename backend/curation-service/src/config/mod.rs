/// Configuration management for curation-service
///
/// Every weight and threshold table lives here as an explicit value that is
/// passed into the scoring stages. Loading order:
/// 1. `.env` (dotenvy)
/// 2. optional JSON profile from `CURATION_CONFIG_PATH`
/// 3. `CURATION_*` scalar overrides (envy)
///
/// `validate()` runs last; a bad table fails at startup, never at request time.
use crate::models::{ContentKind, InteractionKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config profile {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config profile: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read environment overrides: {0}")]
    Env(#[from] envy::Error),
}

/// Upper bounds keeping every derived timestamp inside chrono's range
const MAX_WINDOW_DAYS: i64 = 3_650;
const MAX_TTL_DAYS: i64 = 365;
const MAX_FUTURE_SKEW_SECS: i64 = 86_400;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, format!("expected finite value >= 0, got {}", value)));
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("expected finite value > 0, got {}", value)));
    }
    Ok(())
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("expected value in [0, 1], got {}", value)));
    }
    Ok(())
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub aggregation: AggregationConfig,
    pub scoring: ScoringConfig,
    pub suggestions: SuggestionConfig,
    pub prediction: PredictionConfig,
    pub curation: CurationConfig,
    pub batch: BatchConfig,
}

/// Interaction aggregation window and source limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Trailing window length in days
    pub window_days: i64,
    /// Upper bound for a single signal fetch
    pub source_timeout_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            source_timeout_ms: 500,
        }
    }
}

impl AggregationConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.window_days).unwrap_or(chrono::Duration::MAX)
    }
}

/// Per-kind weights for the interaction score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionWeights {
    pub message: f64,
    pub comment: f64,
    pub reaction: f64,
    pub story_view: f64,
    pub co_attendance: f64,
}

impl Default for InteractionWeights {
    fn default() -> Self {
        Self {
            message: 3.0,
            comment: 2.0,
            reaction: 1.0,
            story_view: 0.5,
            co_attendance: 5.0,
        }
    }
}

impl InteractionWeights {
    pub fn weight(&self, kind: InteractionKind) -> f64 {
        match kind {
            InteractionKind::Message => self.message,
            InteractionKind::Comment => self.comment,
            InteractionKind::Reaction => self.reaction,
            InteractionKind::StoryView => self.story_view,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: InteractionWeights,
    /// Days of inactivity before consistency starts to decay
    pub consistency_grace_days: f64,
    /// Time constant of the exponential decay, in days
    pub consistency_decay_days: f64,
    /// Total time-in-content that earns a full engagement measure
    pub total_time_cap_secs: f64,
    /// Average time per interaction that earns a full engagement measure
    pub per_interaction_cap_secs: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: InteractionWeights::default(),
            consistency_grace_days: 7.0,
            consistency_decay_days: 14.0,
            total_time_cap_secs: 3600.0,
            per_interaction_cap_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub ttl_days: i64,
    /// Minimum |current - suggested| that produces a suggestion
    pub min_rank_delta: u32,
    pub base_confidence: u8,
    pub confidence_step: u8,
    pub max_confidence: u8,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            min_rank_delta: 1,
            base_confidence: 50,
            confidence_step: 10,
            max_confidence: 95,
        }
    }
}

impl SuggestionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.ttl_days).unwrap_or(chrono::Duration::MAX)
    }
}

/// Body-length bands for the engagement predictor (in characters)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthBands {
    pub short_min: usize,
    pub sweet_min: usize,
    pub sweet_max: usize,
    pub long_max: usize,
    pub sweet_factor: f64,
    pub near_factor: f64,
    pub extreme_factor: f64,
}

impl Default for LengthBands {
    fn default() -> Self {
        Self {
            short_min: 20,
            sweet_min: 50,
            sweet_max: 280,
            long_max: 1000,
            sweet_factor: 1.0,
            near_factor: 0.85,
            extreme_factor: 0.6,
        }
    }
}

/// Default attention curve by UTC hour: morning, lunch and evening peaks
fn default_hour_weights() -> Vec<f64> {
    vec![
        0.30, 0.25, 0.20, 0.20, 0.20, 0.30, // 00-05
        0.60, 0.90, 1.00, 0.95, 0.75, 0.85, // 06-11
        1.00, 0.95, 0.70, 0.65, 0.70, 0.80, // 12-17
        0.95, 1.00, 1.00, 0.95, 0.70, 0.50, // 18-23
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub author_weight: f64,
    pub kind_weight: f64,
    pub timing_weight: f64,
    pub length_weight: f64,
    pub hour_weights: Vec<f64>,
    pub length_bands: LengthBands,
    /// Baseline used when an author or kind has no history
    pub baseline_reactions: f64,
    pub baseline_comments: f64,
    /// A comment counts this many reactions in the raw engagement volume
    pub comment_weight: f64,
    /// Raw volume at which a history factor reaches 0.5
    pub half_saturation: f64,
    /// Combined samples needed for full confidence
    pub full_confidence_samples: u32,
    pub history_timeout_ms: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            author_weight: 0.45,
            kind_weight: 0.30,
            timing_weight: 0.15,
            length_weight: 0.10,
            hour_weights: default_hour_weights(),
            length_bands: LengthBands::default(),
            baseline_reactions: 2.0,
            baseline_comments: 0.5,
            comment_weight: 2.0,
            half_saturation: 5.0,
            full_confidence_samples: 20,
            history_timeout_ms: 200,
        }
    }
}

impl PredictionConfig {
    pub fn history_timeout(&self) -> Duration {
        Duration::from_millis(self.history_timeout_ms)
    }
}

/// One recency step: items no older than `max_age_hours` get `boost`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecencyBand {
    pub max_age_hours: f64,
    pub boost: f64,
}

fn default_recency_bands() -> Vec<RecencyBand> {
    vec![
        RecencyBand { max_age_hours: 1.0, boost: 1.0 },
        RecencyBand { max_age_hours: 6.0, boost: 0.8 },
        RecencyBand { max_age_hours: 24.0, boost: 0.6 },
        RecencyBand { max_age_hours: 72.0, boost: 0.4 },
    ]
}

/// A value per content kind (used both for kind weights and the target mix)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindTable {
    pub post: f64,
    pub poll: f64,
    pub event: f64,
    pub broadcast: f64,
}

impl KindTable {
    pub fn get(&self, kind: ContentKind) -> f64 {
        match kind {
            ContentKind::Post => self.post,
            ContentKind::Poll => self.poll,
            ContentKind::Event => self.event,
            ContentKind::Broadcast => self.broadcast,
        }
    }

    fn values(&self) -> [f64; 4] {
        [self.post, self.poll, self.event, self.broadcast]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub rank_weight: f64,
    pub engagement_weight: f64,
    pub recency_weight: f64,
    pub kind_weight: f64,
    /// Lowest representable connection rank
    pub max_rank: u32,
    /// Rank weight at `max_rank` and for unranked authors
    pub min_rank_weight: f64,
    pub recency_bands: Vec<RecencyBand>,
    /// Boost for items older than the last band
    pub stale_boost: f64,
    pub kind_weights: KindTable,
    pub max_per_author_kind: usize,
    /// Largest share of the working pool a single kind may take
    pub max_kind_share: f64,
    pub target_mix: KindTable,
    /// Size of the rebalanced set that pages are cut from
    pub curated_set_size: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Engagement prediction used when none is available for an item
    pub neutral_engagement: f64,
    /// Creation timestamps further in the future than this are malformed
    pub max_future_skew_secs: i64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            rank_weight: 0.40,
            engagement_weight: 0.30,
            recency_weight: 0.20,
            kind_weight: 0.10,
            max_rank: 28,
            min_rank_weight: 0.1,
            recency_bands: default_recency_bands(),
            stale_boost: 0.2,
            kind_weights: KindTable {
                post: 1.0,
                poll: 1.1,
                event: 1.05,
                broadcast: 0.9,
            },
            max_per_author_kind: 3,
            max_kind_share: 0.5,
            target_mix: KindTable {
                post: 0.60,
                poll: 0.20,
                event: 0.15,
                broadcast: 0.05,
            },
            curated_set_size: 100,
            default_page_size: 20,
            max_page_size: 50,
            neutral_engagement: 0.5,
            max_future_skew_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Viewers recomputed concurrently
    pub max_concurrent_viewers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_viewers: 8,
        }
    }
}

/// `CURATION_*` environment overrides
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    config_path: Option<String>,
    window_days: Option<i64>,
    source_timeout_ms: Option<u64>,
    history_timeout_ms: Option<u64>,
    suggestion_ttl_days: Option<i64>,
    max_rank: Option<u32>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
    batch_concurrency: Option<usize>,
}

impl EnvOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.window_days {
            config.aggregation.window_days = v;
        }
        if let Some(v) = self.source_timeout_ms {
            config.aggregation.source_timeout_ms = v;
        }
        if let Some(v) = self.history_timeout_ms {
            config.prediction.history_timeout_ms = v;
        }
        if let Some(v) = self.suggestion_ttl_days {
            config.suggestions.ttl_days = v;
        }
        if let Some(v) = self.max_rank {
            config.curation.max_rank = v;
        }
        if let Some(v) = self.default_page_size {
            config.curation.default_page_size = v;
        }
        if let Some(v) = self.max_page_size {
            config.curation.max_page_size = v;
        }
        if let Some(v) = self.batch_concurrency {
            config.batch.max_concurrent_viewers = v;
        }
    }
}

impl Config {
    /// Load configuration from `.env`, an optional JSON profile and `CURATION_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let overrides: EnvOverrides = envy::prefixed("CURATION_").from_env()?;
        let mut config = match overrides.config_path.as_deref() {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };
        overrides.apply(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Parse and validate a JSON weight profile. Missing keys keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_aggregation()?;
        self.validate_scoring()?;
        self.validate_suggestions()?;
        self.validate_prediction()?;
        self.validate_curation()?;

        if self.batch.max_concurrent_viewers == 0 {
            return Err(invalid("batch.max_concurrent_viewers", "must be at least 1"));
        }
        Ok(())
    }

    fn validate_aggregation(&self) -> Result<(), ConfigError> {
        let a = &self.aggregation;
        if !(1..=MAX_WINDOW_DAYS).contains(&a.window_days) {
            return Err(invalid(
                "aggregation.window_days",
                format!("expected 1..={}, got {}", MAX_WINDOW_DAYS, a.window_days),
            ));
        }
        if a.source_timeout_ms == 0 {
            return Err(invalid("aggregation.source_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    fn validate_scoring(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        check_non_negative("scoring.weights.message", s.weights.message)?;
        check_non_negative("scoring.weights.comment", s.weights.comment)?;
        check_non_negative("scoring.weights.reaction", s.weights.reaction)?;
        check_non_negative("scoring.weights.story_view", s.weights.story_view)?;
        check_non_negative("scoring.weights.co_attendance", s.weights.co_attendance)?;
        check_non_negative("scoring.consistency_grace_days", s.consistency_grace_days)?;
        check_positive("scoring.consistency_decay_days", s.consistency_decay_days)?;
        check_positive("scoring.total_time_cap_secs", s.total_time_cap_secs)?;
        check_positive("scoring.per_interaction_cap_secs", s.per_interaction_cap_secs)?;
        Ok(())
    }

    fn validate_suggestions(&self) -> Result<(), ConfigError> {
        let s = &self.suggestions;
        if !(1..=MAX_TTL_DAYS).contains(&s.ttl_days) {
            return Err(invalid(
                "suggestions.ttl_days",
                format!("expected 1..={}, got {}", MAX_TTL_DAYS, s.ttl_days),
            ));
        }
        if s.min_rank_delta == 0 {
            return Err(invalid("suggestions.min_rank_delta", "must be at least 1"));
        }
        if s.max_confidence > 100 || s.base_confidence > s.max_confidence {
            return Err(invalid(
                "suggestions.max_confidence",
                "expected base_confidence <= max_confidence <= 100",
            ));
        }
        Ok(())
    }

    fn validate_prediction(&self) -> Result<(), ConfigError> {
        let p = &self.prediction;
        check_non_negative("prediction.author_weight", p.author_weight)?;
        check_non_negative("prediction.kind_weight", p.kind_weight)?;
        check_non_negative("prediction.timing_weight", p.timing_weight)?;
        check_non_negative("prediction.length_weight", p.length_weight)?;
        if p.author_weight + p.kind_weight <= 0.0 {
            return Err(invalid("prediction.author_weight", "history weights sum to zero"));
        }
        if p.timing_weight + p.length_weight <= 0.0 {
            return Err(invalid("prediction.timing_weight", "heuristic weights sum to zero"));
        }
        if p.hour_weights.len() != 24 {
            return Err(invalid(
                "prediction.hour_weights",
                format!("expected 24 entries, got {}", p.hour_weights.len()),
            ));
        }
        for w in &p.hour_weights {
            check_unit("prediction.hour_weights", *w)?;
        }

        let b = &p.length_bands;
        if !(b.short_min <= b.sweet_min
            && b.sweet_min <= b.sweet_max
            && b.sweet_max <= b.long_max)
        {
            return Err(invalid(
                "prediction.length_bands",
                "expected short_min <= sweet_min <= sweet_max <= long_max",
            ));
        }
        check_unit("prediction.length_bands.sweet_factor", b.sweet_factor)?;
        check_unit("prediction.length_bands.near_factor", b.near_factor)?;
        check_unit("prediction.length_bands.extreme_factor", b.extreme_factor)?;

        check_non_negative("prediction.baseline_reactions", p.baseline_reactions)?;
        check_non_negative("prediction.baseline_comments", p.baseline_comments)?;
        check_non_negative("prediction.comment_weight", p.comment_weight)?;
        check_positive("prediction.half_saturation", p.half_saturation)?;
        if p.full_confidence_samples == 0 {
            return Err(invalid("prediction.full_confidence_samples", "must be at least 1"));
        }
        if p.history_timeout_ms == 0 {
            return Err(invalid("prediction.history_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    fn validate_curation(&self) -> Result<(), ConfigError> {
        let c = &self.curation;
        check_non_negative("curation.rank_weight", c.rank_weight)?;
        check_non_negative("curation.engagement_weight", c.engagement_weight)?;
        check_non_negative("curation.recency_weight", c.recency_weight)?;
        check_non_negative("curation.kind_weight", c.kind_weight)?;
        if c.rank_weight + c.engagement_weight + c.recency_weight + c.kind_weight <= 0.0 {
            return Err(invalid("curation.rank_weight", "composite weights sum to zero"));
        }

        if c.max_rank < 2 {
            return Err(invalid("curation.max_rank", "must be at least 2"));
        }
        if !(c.min_rank_weight > 0.0 && c.min_rank_weight <= 1.0) {
            return Err(invalid("curation.min_rank_weight", "expected value in (0, 1]"));
        }

        if c.recency_bands.is_empty() {
            return Err(invalid("curation.recency_bands", "at least one band is required"));
        }
        for pair in c.recency_bands.windows(2) {
            if pair[1].max_age_hours <= pair[0].max_age_hours || pair[1].boost > pair[0].boost {
                return Err(invalid(
                    "curation.recency_bands",
                    "ages must increase and boosts must not increase",
                ));
            }
        }
        for band in &c.recency_bands {
            check_positive("curation.recency_bands.max_age_hours", band.max_age_hours)?;
            check_unit("curation.recency_bands.boost", band.boost)?;
        }
        check_unit("curation.stale_boost", c.stale_boost)?;
        if let Some(last) = c.recency_bands.last() {
            if c.stale_boost > last.boost {
                return Err(invalid("curation.stale_boost", "exceeds the oldest band's boost"));
            }
        }

        for w in c.kind_weights.values() {
            check_positive("curation.kind_weights", w)?;
        }
        let mut mix_total = 0.0;
        for share in c.target_mix.values() {
            check_unit("curation.target_mix", share)?;
            mix_total += share;
        }
        if (mix_total - 1.0).abs() > 1e-6 {
            return Err(invalid(
                "curation.target_mix",
                format!("shares must sum to 1.0, got {}", mix_total),
            ));
        }

        if c.max_per_author_kind == 0 {
            return Err(invalid("curation.max_per_author_kind", "must be at least 1"));
        }
        if !(c.max_kind_share > 0.0 && c.max_kind_share <= 1.0) {
            return Err(invalid("curation.max_kind_share", "expected value in (0, 1]"));
        }
        if c.curated_set_size == 0 {
            return Err(invalid("curation.curated_set_size", "must be at least 1"));
        }
        if c.default_page_size == 0 || c.default_page_size > c.max_page_size {
            return Err(invalid(
                "curation.default_page_size",
                "expected 1 <= default_page_size <= max_page_size",
            ));
        }
        check_unit("curation.neutral_engagement", c.neutral_engagement)?;
        if !(0..=MAX_FUTURE_SKEW_SECS).contains(&c.max_future_skew_secs) {
            return Err(invalid(
                "curation.max_future_skew_secs",
                format!("expected 0..={}, got {}", MAX_FUTURE_SKEW_SECS, c.max_future_skew_secs),
            ));
        }
        Ok(())
    }
}
