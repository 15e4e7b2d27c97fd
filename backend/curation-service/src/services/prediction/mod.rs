// ============================================
// Engagement Predictor
// ============================================
//
// Estimates how a candidate item will be received from:
// 1. Author history (weighted highest)
// 2. Content-kind history
// 3. Hour-of-day attention curve (fixed lookup, not learned)
// 4. Body-length sweet spot
//
// Missing history falls back to a conservative baseline. History fetches go
// through `EngagementHistorySource` under a timeout and degrade to the
// baseline when slow or failing.

use crate::config::PredictionConfig;
use crate::error::Result;
use crate::models::{CandidateItem, ContentKind};
use crate::utils::saturate;
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Historical engagement for an author or a content kind
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EngagementHistory {
    pub sample_count: u32,
    pub avg_reactions: f64,
    pub avg_comments: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngagementPrediction {
    pub item_id: Uuid,
    pub predicted_reactions: f64,
    pub predicted_comments: f64,
    /// Combined prediction in [0, 1]
    pub engagement_prediction: f64,
    /// Grows with available history, 1.0 at `full_confidence_samples`
    pub confidence: f64,
}

#[async_trait]
pub trait EngagementHistorySource: Send + Sync {
    async fn author_history(&self, author_id: Uuid) -> Result<Option<EngagementHistory>>;
    async fn kind_history(&self, kind: ContentKind) -> Result<Option<EngagementHistory>>;
}

/// Fixed in-memory history tables
#[derive(Debug, Clone, Default)]
pub struct StaticHistorySource {
    pub authors: HashMap<Uuid, EngagementHistory>,
    pub kinds: HashMap<ContentKind, EngagementHistory>,
}

#[async_trait]
impl EngagementHistorySource for StaticHistorySource {
    async fn author_history(&self, author_id: Uuid) -> Result<Option<EngagementHistory>> {
        Ok(self.authors.get(&author_id).copied())
    }

    async fn kind_history(&self, kind: ContentKind) -> Result<Option<EngagementHistory>> {
        Ok(self.kinds.get(&kind).copied())
    }
}

#[derive(Debug, Clone)]
pub struct EngagementPredictor {
    config: PredictionConfig,
}

impl Default for EngagementPredictor {
    fn default() -> Self {
        Self::new(PredictionConfig::default())
    }
}

impl EngagementPredictor {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    fn baseline(&self) -> EngagementHistory {
        EngagementHistory {
            sample_count: 0,
            avg_reactions: self.config.baseline_reactions,
            avg_comments: self.config.baseline_comments,
        }
    }

    /// Attention weight for the item's creation hour (UTC)
    pub fn timing_factor(&self, created_at: DateTime<Utc>) -> f64 {
        self.config
            .hour_weights
            .get(created_at.hour() as usize)
            .copied()
            .unwrap_or(0.5)
    }

    /// 1.0 in the sweet spot, lower for very short or very long bodies
    pub fn length_factor(&self, body: &str) -> f64 {
        let bands = &self.config.length_bands;
        let len = body.trim().chars().count();
        if len < bands.short_min || len > bands.long_max {
            bands.extreme_factor
        } else if len < bands.sweet_min || len > bands.sweet_max {
            bands.near_factor
        } else {
            bands.sweet_factor
        }
    }

    /// Pure prediction from already-fetched histories
    pub fn predict(
        &self,
        item: &CandidateItem,
        author: Option<&EngagementHistory>,
        kind: Option<&EngagementHistory>,
    ) -> EngagementPrediction {
        let baseline = self.baseline();
        let author = author.copied().unwrap_or(baseline);
        let kind = kind.copied().unwrap_or(baseline);
        let c = &self.config;

        let timing = self.timing_factor(item.created_at);
        let length = self.length_factor(&item.body);

        let history_total = c.author_weight + c.kind_weight;
        let modifier =
            (c.timing_weight * timing + c.length_weight * length)
                / (c.timing_weight + c.length_weight);

        let blend = |a: f64, k: f64| (c.author_weight * a + c.kind_weight * k) / history_total;
        let predicted_reactions = blend(author.avg_reactions, kind.avg_reactions) * modifier;
        let predicted_comments = blend(author.avg_comments, kind.avg_comments) * modifier;

        let volume = |h: &EngagementHistory| {
            saturate(h.avg_reactions + c.comment_weight * h.avg_comments, c.half_saturation)
        };
        let weight_total = history_total + c.timing_weight + c.length_weight;
        let engagement_prediction = ((c.author_weight * volume(&author)
            + c.kind_weight * volume(&kind)
            + c.timing_weight * timing
            + c.length_weight * length)
            / weight_total)
            .clamp(0.0, 1.0);

        let samples = author.sample_count.saturating_add(kind.sample_count);
        let confidence = (f64::from(samples) / f64::from(c.full_confidence_samples)).min(1.0);

        EngagementPrediction {
            item_id: item.id,
            predicted_reactions,
            predicted_comments,
            engagement_prediction,
            confidence,
        }
    }

    /// Predict a batch, fetching each distinct author/kind history once under the timeout
    pub async fn predict_all(
        &self,
        items: &[CandidateItem],
        source: &dyn EngagementHistorySource,
    ) -> HashMap<Uuid, EngagementPrediction> {
        let timeout = self.config.history_timeout();

        let authors: HashSet<Uuid> = items.iter().map(|i| i.author_id).collect();
        let kinds: HashSet<ContentKind> = items.iter().map(|i| i.kind).collect();

        let (author_histories, kind_histories) = tokio::join!(
            join_all(authors.into_iter().map(|author_id| async move {
                let history =
                    fetch_bounded(timeout, "author", source.author_history(author_id)).await;
                (author_id, history)
            })),
            join_all(kinds.into_iter().map(|kind| async move {
                let history =
                    fetch_bounded(timeout, kind.as_str(), source.kind_history(kind)).await;
                (kind, history)
            })),
        );

        let author_histories: HashMap<Uuid, EngagementHistory> = author_histories
            .into_iter()
            .filter_map(|(id, h)| h.map(|h| (id, h)))
            .collect();
        let kind_histories: HashMap<ContentKind, EngagementHistory> = kind_histories
            .into_iter()
            .filter_map(|(k, h)| h.map(|h| (k, h)))
            .collect();

        debug!(
            items = items.len(),
            authors_with_history = author_histories.len(),
            kinds_with_history = kind_histories.len(),
            "Engagement histories fetched"
        );

        items
            .iter()
            .map(|item| {
                let prediction = self.predict(
                    item,
                    author_histories.get(&item.author_id),
                    kind_histories.get(&item.kind),
                );
                (item.id, prediction)
            })
            .collect()
    }
}

/// `None` on error, timeout or missing history; the caller falls back to the baseline
async fn fetch_bounded<F>(timeout: Duration, label: &str, future: F) -> Option<EngagementHistory>
where
    F: Future<Output = Result<Option<EngagementHistory>>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(history)) => history,
        Ok(Err(e)) => {
            warn!(history = label, error = %e, "Engagement history fetch failed, using baseline");
            None
        }
        Err(_) => {
            warn!(
                history = label,
                timeout_ms = timeout.as_millis() as u64,
                "Engagement history fetch timed out, using baseline"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CurationError;
    use chrono::TimeZone;

    fn item_at(hour: u32, body: &str) -> CandidateItem {
        CandidateItem {
            id: Uuid::new_v4(),
            kind: ContentKind::Post,
            author_id: Uuid::new_v4(),
            body: body.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 10, hour, 15, 0).unwrap(),
        }
    }

    fn sweet_body() -> String {
        "a".repeat(120)
    }

    #[test]
    fn test_timing_peaks() {
        let predictor = EngagementPredictor::default();
        let evening = predictor.timing_factor(item_at(19, "").created_at);
        let lunch = predictor.timing_factor(item_at(12, "").created_at);
        let night = predictor.timing_factor(item_at(3, "").created_at);

        assert_eq!(evening, 1.0);
        assert_eq!(lunch, 1.0);
        assert!(night < 0.5);
    }

    #[test]
    fn test_length_sweet_spot() {
        let predictor = EngagementPredictor::default();
        assert_eq!(predictor.length_factor(&sweet_body()), 1.0);
        assert_eq!(predictor.length_factor("short but not tiny body"), 0.85);
        assert_eq!(predictor.length_factor("hi"), 0.6);
        assert_eq!(predictor.length_factor(&"x".repeat(5000)), 0.6);
    }

    #[test]
    fn test_author_history_dominates() {
        let predictor = EngagementPredictor::default();
        let item = item_at(19, &sweet_body());
        let popular = EngagementHistory {
            sample_count: 30,
            avg_reactions: 40.0,
            avg_comments: 10.0,
        };
        let quiet = EngagementHistory {
            sample_count: 30,
            avg_reactions: 0.5,
            avg_comments: 0.0,
        };

        let popular_author = predictor.predict(&item, Some(&popular), Some(&quiet));
        let popular_kind = predictor.predict(&item, Some(&quiet), Some(&popular));

        assert!(popular_author.engagement_prediction > popular_kind.engagement_prediction);
        assert!(popular_author.predicted_reactions > popular_kind.predicted_reactions);
        assert_eq!(popular_author.confidence, 1.0);
    }

    #[test]
    fn test_missing_history_uses_baseline() {
        let predictor = EngagementPredictor::default();
        let item = item_at(8, &sweet_body());
        let prediction = predictor.predict(&item, None, None);

        // Peak hour + sweet-spot length leaves the baseline untouched
        assert!((prediction.predicted_reactions - 2.0).abs() < 1e-9);
        assert!((prediction.predicted_comments - 0.5).abs() < 1e-9);
        assert_eq!(prediction.confidence, 0.0);
        assert!(prediction.engagement_prediction > 0.0 && prediction.engagement_prediction < 1.0);
    }

    #[test]
    fn test_confidence_grows_with_samples() {
        let predictor = EngagementPredictor::default();
        let item = item_at(8, &sweet_body());
        let few = EngagementHistory {
            sample_count: 5,
            ..Default::default()
        };
        assert!((predictor.predict(&item, Some(&few), None).confidence - 0.25).abs() < 1e-9);
        assert!((predictor.predict(&item, Some(&few), Some(&few)).confidence - 0.5).abs() < 1e-9);
    }

    struct BrokenSource;

    #[async_trait]
    impl EngagementHistorySource for BrokenSource {
        async fn author_history(&self, _: Uuid) -> Result<Option<EngagementHistory>> {
            Err(CurationError::Source("history store offline".into()))
        }

        async fn kind_history(&self, _: ContentKind) -> Result<Option<EngagementHistory>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_degrades_to_baseline() {
        let predictor = EngagementPredictor::new(PredictionConfig {
            history_timeout_ms: 20,
            ..Default::default()
        });
        let items = vec![item_at(8, &sweet_body()), item_at(19, &sweet_body())];

        let predictions = predictor.predict_all(&items, &BrokenSource).await;

        assert_eq!(predictions.len(), 2);
        for item in &items {
            let expected = predictor.predict(item, None, None);
            assert_eq!(predictions[&item.id], expected);
        }
    }

    #[tokio::test]
    async fn test_static_source_lookup() {
        let predictor = EngagementPredictor::default();
        let item = item_at(19, &sweet_body());
        let mut source = StaticHistorySource::default();
        source.authors.insert(
            item.author_id,
            EngagementHistory {
                sample_count: 12,
                avg_reactions: 9.0,
                avg_comments: 3.0,
            },
        );

        let predictions = predictor.predict_all(std::slice::from_ref(&item), &source).await;
        assert!((predictions[&item.id].confidence - 0.6).abs() < 1e-9);
    }
}
