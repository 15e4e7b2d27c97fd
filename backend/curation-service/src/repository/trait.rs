use crate::error::Result;
use crate::models::{RankSuggestion, ScoreRecord, SuggestionStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage for the latest score set of each viewer.
#[async_trait::async_trait]
pub trait ScoreRepository: Send + Sync {
    /// Overwrite the viewer's score set with `records`
    async fn upsert_scores(&self, viewer_id: Uuid, records: Vec<ScoreRecord>) -> Result<()>;

    /// Score records for a viewer, ordered by current rank
    async fn scores_for_viewer(&self, viewer_id: Uuid) -> Result<Vec<ScoreRecord>>;

    async fn get_score(&self, viewer_id: Uuid, connection_id: Uuid)
        -> Result<Option<ScoreRecord>>;
}

/// Storage for rank suggestions and their lifecycle.
#[async_trait::async_trait]
pub trait SuggestionRepository: Send + Sync {
    /// Atomically supersede every pending suggestion of the viewer and insert `fresh`.
    /// Returns the number of superseded suggestions.
    async fn replace_pending(&self, viewer_id: Uuid, fresh: Vec<RankSuggestion>) -> Result<usize>;

    /// Pending and not expired, ordered by suggested rank
    async fn pending_for_viewer(
        &self,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankSuggestion>>;

    /// Accept or dismiss a live pending suggestion
    async fn resolve(
        &self,
        suggestion_id: Uuid,
        status: SuggestionStatus,
        now: DateTime<Utc>,
    ) -> Result<RankSuggestion>;

    /// Flip overdue pending suggestions to expired.
    /// Returns: number of suggestions expired
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize>;
}
