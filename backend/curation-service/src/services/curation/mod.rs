/// Curation Assembler
///
/// Turns a viewer's candidate items into one page of the curated feed.
///
/// # Workflow
/// 1. Drop malformed candidates
/// 2. Composite scoring (rank weight, engagement prediction, recency, kind)
/// 3. Diversity-constrained selection (author/kind cap, kind share cap)
/// 4. Target-mix rebalancing, presented newest-first
/// 5. Pagination
///
/// `assemble` is pure: the same snapshot and `now` always produce the same page.
/// `FeedCurator` wraps it with the time-bounded engagement history fetch.
pub mod scorer;

pub use scorer::CompositeScorer;

use crate::config::{Config, CurationConfig};
use crate::error::{CurationError, Result};
use crate::models::{
    CandidateItem, Connection, CuratedItem, CuratedPage, CurationStats, RawCandidateItem,
};
use crate::services::diversity::DiversityLayer;
use crate::services::prediction::{EngagementHistorySource, EngagementPredictor};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One feed request
#[derive(Debug, Clone)]
pub struct CurationRequest {
    pub viewer_id: Uuid,
    /// 1-based
    pub page: usize,
    /// Falls back to the configured default
    pub page_size: Option<usize>,
    pub now: DateTime<Utc>,
}

/// Author id → the viewer's manual rank for that author
pub fn author_ranks(viewer_id: Uuid, connections: &[Connection]) -> HashMap<Uuid, u32> {
    connections
        .iter()
        .filter(|c| c.viewer_id == viewer_id)
        .map(|c| (c.connection_id, c.rank))
        .collect()
}

impl TryFrom<RawCandidateItem> for CandidateItem {
    type Error = CurationError;

    fn try_from(raw: RawCandidateItem) -> Result<Self> {
        let id = raw
            .id
            .ok_or_else(|| CurationError::MalformedCandidate("missing id".into()))?;
        let missing =
            |field: &str| CurationError::MalformedCandidate(format!("{} missing {}", id, field));

        Ok(CandidateItem {
            id,
            kind: raw.kind.ok_or_else(|| missing("kind"))?,
            author_id: raw.author_id.ok_or_else(|| missing("author_id"))?,
            body: raw.body.unwrap_or_default(),
            created_at: raw.created_at.ok_or_else(|| missing("created_at"))?,
        })
    }
}

pub struct CurationAssembler {
    config: CurationConfig,
    scorer: CompositeScorer,
    diversity: DiversityLayer,
}

impl Default for CurationAssembler {
    fn default() -> Self {
        Self::new(CurationConfig::default())
    }
}

impl CurationAssembler {
    pub fn new(config: CurationConfig) -> Self {
        Self {
            scorer: CompositeScorer::new(config.clone()),
            diversity: DiversityLayer::new(&config),
            config,
        }
    }

    /// Reject items that cannot be scored
    pub fn validate(&self, item: &CandidateItem, now: DateTime<Utc>) -> Result<()> {
        if item.id.is_nil() {
            return Err(CurationError::MalformedCandidate("nil item id".into()));
        }
        if item.author_id.is_nil() {
            return Err(CurationError::MalformedCandidate(format!(
                "{} has nil author id",
                item.id
            )));
        }
        if item.kind.requires_body() && item.body.trim().is_empty() {
            return Err(CurationError::MalformedCandidate(format!(
                "{} ({}) has an empty body",
                item.id,
                item.kind.as_str()
            )));
        }
        let latest = Duration::try_seconds(self.config.max_future_skew_secs)
            .and_then(|skew| now.checked_add_signed(skew))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if item.created_at > latest {
            return Err(CurationError::MalformedCandidate(format!(
                "{} is dated in the future",
                item.id
            )));
        }
        Ok(())
    }

    /// Build one page. Never fails: bad input is excluded and counted in `stats`.
    pub fn assemble(
        &self,
        request: &CurationRequest,
        candidates: Vec<CandidateItem>,
        ranks: &HashMap<Uuid, u32>,
        predictions: &HashMap<Uuid, f64>,
    ) -> CuratedPage {
        let mut stats = CurationStats {
            input_count: candidates.len(),
            ..Default::default()
        };

        let mut seen: HashSet<Uuid> = HashSet::with_capacity(candidates.len());
        let pool: Vec<CuratedItem> = candidates
            .into_iter()
            .filter(|item| match self.validate(item, request.now) {
                Ok(()) => seen.insert(item.id),
                Err(e) => {
                    warn!(viewer_id = %request.viewer_id, error = %e, "Excluding candidate");
                    false
                }
            })
            .map(|item| {
                let rank = ranks.get(&item.author_id).copied();
                let prediction = predictions.get(&item.id).copied();
                self.scorer.score(item, rank, prediction, request.now)
            })
            .collect();
        stats.malformed_count = stats.input_count - pool.len();

        let selection = self.diversity.select(&pool);
        stats.author_capped_count = selection.author_capped;
        stats.kind_capped_count = selection.kind_capped;
        stats.diversity_kept_count = selection.kept.len();

        let rebalanced = self.diversity.rebalance(&selection.kept);
        stats.rebalanced_count = rebalanced.len();

        let page_size = request
            .page_size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let page = paginate(rebalanced, request.page, page_size, stats);

        debug!(
            viewer_id = %request.viewer_id,
            page = page.page,
            items = page.items.len(),
            total_pages = page.total_pages,
            has_more = page.has_more,
            "Curated page assembled"
        );

        page
    }
}

/// Slice a curated set; `page` is 1-based and values below 1 mean the first page
pub fn paginate(
    items: Vec<CuratedItem>,
    page: usize,
    page_size: usize,
    stats: CurationStats,
) -> CuratedPage {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(page_size);

    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    let items: Vec<CuratedItem> = items.into_iter().skip(start).take(end - start).collect();

    CuratedPage {
        items,
        has_more: end < total,
        total_pages,
        page,
        stats,
    }
}

/// Async entry point for feed requests: predicts engagement, then assembles
pub struct FeedCurator {
    assembler: CurationAssembler,
    predictor: EngagementPredictor,
    history: Arc<dyn EngagementHistorySource>,
}

impl FeedCurator {
    pub fn new(config: &Config, history: Arc<dyn EngagementHistorySource>) -> Self {
        Self {
            assembler: CurationAssembler::new(config.curation.clone()),
            predictor: EngagementPredictor::new(config.prediction.clone()),
            history,
        }
    }

    pub async fn curate(
        &self,
        request: &CurationRequest,
        candidates: Vec<CandidateItem>,
        connections: &[Connection],
    ) -> CuratedPage {
        let ranks = author_ranks(request.viewer_id, connections);
        let predictions: HashMap<Uuid, f64> = self
            .predictor
            .predict_all(&candidates, self.history.as_ref())
            .await
            .into_iter()
            .map(|(id, p)| (id, p.engagement_prediction))
            .collect();

        self.assembler
            .assemble(request, candidates, &ranks, &predictions)
    }

    /// Same as `curate` for rows straight off the content feed
    pub async fn curate_raw(
        &self,
        request: &CurationRequest,
        rows: Vec<RawCandidateItem>,
        connections: &[Connection],
    ) -> CuratedPage {
        let input_count = rows.len();
        let candidates: Vec<CandidateItem> = rows
            .into_iter()
            .filter_map(|row| match CandidateItem::try_from(row) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(
                        viewer_id = %request.viewer_id,
                        error = %e,
                        "Dropping malformed feed row"
                    );
                    None
                }
            })
            .collect();
        let dropped = input_count - candidates.len();

        let mut page = self.curate(request, candidates, connections).await;
        page.stats.input_count += dropped;
        page.stats.malformed_count += dropped;
        page
    }
}
