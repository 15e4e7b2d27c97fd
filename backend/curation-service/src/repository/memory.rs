use super::{ScoreRepository, SuggestionRepository};
use crate::error::{CurationError, Result};
use crate::models::{RankSuggestion, ScoreRecord, SuggestionStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// In-process store for scores and suggestions.
///
/// Each viewer's data lives in one DashMap entry, so a replace holds that
/// entry's shard lock for its whole duration and readers never observe a
/// half-applied suggestion set.
#[derive(Default)]
pub struct InMemoryStore {
    scores: DashMap<Uuid, HashMap<Uuid, ScoreRecord>>,
    suggestions: DashMap<Uuid, Vec<RankSuggestion>>,
    /// suggestion id → viewer id
    index: DashMap<Uuid, Uuid>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored suggestion of a viewer regardless of status
    pub fn all_suggestions(&self, viewer_id: Uuid) -> Vec<RankSuggestion> {
        self.suggestions
            .get(&viewer_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ScoreRepository for InMemoryStore {
    async fn upsert_scores(&self, viewer_id: Uuid, records: Vec<ScoreRecord>) -> Result<()> {
        if let Some(foreign) = records.iter().find(|r| r.viewer_id != viewer_id) {
            return Err(CurationError::Storage(format!(
                "score for connection {} belongs to viewer {}, not {}",
                foreign.connection_id, foreign.viewer_id, viewer_id
            )));
        }

        let set: HashMap<Uuid, ScoreRecord> = records
            .into_iter()
            .map(|r| (r.connection_id, r))
            .collect();
        debug!(viewer_id = %viewer_id, records = set.len(), "Storing score set");
        self.scores.insert(viewer_id, set);
        Ok(())
    }

    async fn scores_for_viewer(&self, viewer_id: Uuid) -> Result<Vec<ScoreRecord>> {
        let mut records: Vec<ScoreRecord> = self
            .scores
            .get(&viewer_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| {
            a.current_rank
                .cmp(&b.current_rank)
                .then_with(|| a.connection_id.cmp(&b.connection_id))
        });
        Ok(records)
    }

    async fn get_score(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
    ) -> Result<Option<ScoreRecord>> {
        Ok(self
            .scores
            .get(&viewer_id)
            .and_then(|set| set.get(&connection_id).cloned()))
    }
}

#[async_trait::async_trait]
impl SuggestionRepository for InMemoryStore {
    async fn replace_pending(&self, viewer_id: Uuid, fresh: Vec<RankSuggestion>) -> Result<usize> {
        let mut connections = HashSet::with_capacity(fresh.len());
        for suggestion in &fresh {
            if suggestion.viewer_id != viewer_id {
                return Err(CurationError::Storage(format!(
                    "suggestion {} belongs to viewer {}, not {}",
                    suggestion.id, suggestion.viewer_id, viewer_id
                )));
            }
            if !connections.insert(suggestion.connection_id) {
                return Err(CurationError::Storage(format!(
                    "duplicate suggestion for connection {}",
                    suggestion.connection_id
                )));
            }
        }

        let fresh_ids: Vec<Uuid> = fresh.iter().map(|s| s.id).collect();
        let superseded_ids: Vec<Uuid> = {
            let mut entry = self.suggestions.entry(viewer_id).or_default();
            let (superseded, kept): (Vec<RankSuggestion>, Vec<RankSuggestion>) = entry
                .drain(..)
                .partition(|s| s.status == SuggestionStatus::Pending);
            *entry = kept;
            entry.extend(fresh);
            superseded.into_iter().map(|s| s.id).collect()
        };

        for id in &superseded_ids {
            self.index.remove(id);
        }
        for id in fresh_ids {
            self.index.insert(id, viewer_id);
        }

        debug!(
            viewer_id = %viewer_id,
            superseded = superseded_ids.len(),
            "Pending suggestions replaced"
        );
        Ok(superseded_ids.len())
    }

    async fn pending_for_viewer(
        &self,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankSuggestion>> {
        let mut live: Vec<RankSuggestion> = self
            .suggestions
            .get(&viewer_id)
            .map(|entry| entry.iter().filter(|s| s.is_live(now)).cloned().collect())
            .unwrap_or_default();
        live.sort_by(|a, b| {
            a.suggested_rank
                .cmp(&b.suggested_rank)
                .then_with(|| a.connection_id.cmp(&b.connection_id))
        });
        Ok(live)
    }

    async fn resolve(
        &self,
        suggestion_id: Uuid,
        status: SuggestionStatus,
        now: DateTime<Utc>,
    ) -> Result<RankSuggestion> {
        if !matches!(status, SuggestionStatus::Accepted | SuggestionStatus::Dismissed) {
            return Err(CurationError::InvalidTransition(format!(
                "suggestions can only be accepted or dismissed, not {:?}",
                status
            )));
        }

        let not_found = || CurationError::NotFound(format!("suggestion {}", suggestion_id));
        let viewer_id = self
            .index
            .get(&suggestion_id)
            .map(|v| *v)
            .ok_or_else(not_found)?;

        let mut entry = self.suggestions.get_mut(&viewer_id).ok_or_else(not_found)?;
        let suggestion = entry
            .iter_mut()
            .find(|s| s.id == suggestion_id)
            .ok_or_else(not_found)?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(CurationError::InvalidTransition(format!(
                "suggestion {} is already {:?}",
                suggestion_id, suggestion.status
            )));
        }
        if !suggestion.is_live(now) {
            suggestion.status = SuggestionStatus::Expired;
            return Err(CurationError::InvalidTransition(format!(
                "suggestion {} expired at {}",
                suggestion_id, suggestion.expires_at
            )));
        }

        suggestion.status = status;
        Ok(suggestion.clone())
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = 0;
        for mut entry in self.suggestions.iter_mut() {
            for suggestion in entry.value_mut().iter_mut() {
                if suggestion.status == SuggestionStatus::Pending && suggestion.expires_at <= now {
                    suggestion.status = SuggestionStatus::Expired;
                    expired += 1;
                }
            }
        }
        debug!(expired, "Stale suggestions expired");
        Ok(expired)
    }
}
