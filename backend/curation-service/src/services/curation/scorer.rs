/// Composite scoring for feed candidates
///
/// final = w_rank * rank_weight + w_eng * engagement + w_rec * recency + w_kind * kind_weight
use crate::config::CurationConfig;
use crate::models::{CandidateItem, ContentKind, CurationType, CuratedItem};
use crate::utils::hours_between;
use chrono::{DateTime, Utc};

const CLOSE_CONNECTION_THRESHOLD: f64 = 0.8;
const HIGH_ENGAGEMENT_THRESHOLD: f64 = 0.7;
const FRESH_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct CompositeScorer {
    config: CurationConfig,
}

impl Default for CompositeScorer {
    fn default() -> Self {
        Self::new(CurationConfig::default())
    }
}

impl CompositeScorer {
    pub fn new(config: CurationConfig) -> Self {
        Self { config }
    }

    /// 1.0 at rank 1, linear down to `min_rank_weight` at `max_rank`.
    /// Unranked authors and ranks past the maximum get the lowest tier.
    pub fn rank_weight(&self, rank: Option<u32>) -> f64 {
        let max_rank = self.config.max_rank.max(2);
        let floor = self.config.min_rank_weight;
        match rank {
            Some(r) if (1..=max_rank).contains(&r) => {
                // Anchored at the floor so the last rank lands on it exactly
                let remaining = f64::from(max_rank - r) / f64::from(max_rank - 1);
                (floor + (1.0 - floor) * remaining).max(floor).min(1.0)
            }
            _ => floor,
        }
    }

    /// Five-band step function over item age
    pub fn recency_boost(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_hours = hours_between(created_at, now);
        self.config
            .recency_bands
            .iter()
            .find(|band| age_hours <= band.max_age_hours)
            .map(|band| band.boost)
            .unwrap_or(self.config.stale_boost)
    }

    pub fn kind_weight(&self, kind: ContentKind) -> f64 {
        self.config.kind_weights.get(kind)
    }

    pub fn score(
        &self,
        item: CandidateItem,
        author_rank: Option<u32>,
        engagement_prediction: Option<f64>,
        now: DateTime<Utc>,
    ) -> CuratedItem {
        let c = &self.config;
        let rank_weight = self.rank_weight(author_rank);
        let engagement = engagement_prediction
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 1.0))
            .unwrap_or(c.neutral_engagement);
        let recency = self.recency_boost(item.created_at, now);
        let kind_weight = self.kind_weight(item.kind);

        let relevance_score =
            c.rank_weight * rank_weight
                + c.engagement_weight * engagement
                + c.recency_weight * recency;
        let final_score = relevance_score + c.kind_weight * kind_weight;

        let curation_type = if rank_weight >= CLOSE_CONNECTION_THRESHOLD {
            CurationType::CloseConnection
        } else if engagement >= HIGH_ENGAGEMENT_THRESHOLD {
            CurationType::HighEngagement
        } else if recency >= FRESH_THRESHOLD {
            CurationType::Fresh
        } else {
            CurationType::Discovery
        };

        CuratedItem {
            item,
            relevance_score,
            engagement_prediction: engagement,
            rank_weight,
            diversity_boost: kind_weight,
            final_score,
            curation_type,
        }
    }
}
