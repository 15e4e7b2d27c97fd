// ============================================
// Affinity Recompute Job
// ============================================
//
// Recomputes closeness scores and rank suggestions for every viewer in a
// connection snapshot.
//
// Workflow per viewer:
// 1. Aggregate interaction tallies for each connection over the trailing window
// 2. Score every tally
// 3. Overwrite the viewer's score set
// 4. Generate rank suggestions
// 5. Atomically replace the viewer's pending suggestions
//
// Viewers run concurrently up to `batch.max_concurrent_viewers`; the same
// viewer is serialized through `ViewerLocks` for the whole pipeline.

use crate::config::{BatchConfig, Config};
use crate::error::Result;
use crate::models::{Connection, SignalSource};
use crate::repository::{ScoreRepository, SuggestionRepository};
use crate::services::aggregator::{InteractionAggregator, InteractionLog};
use crate::services::scoring::ScoreCalculator;
use crate::services::suggestions::RankSuggestionGenerator;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-viewer async locks. An entry lives only while someone holds or awaits it.
#[derive(Default)]
pub struct ViewerLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ViewerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the viewer's pipeline
    pub async fn acquire(&self, viewer_id: Uuid) -> ViewerGuard<'_> {
        let lock = self
            .locks
            .entry(viewer_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ViewerGuard {
            locks: &self.locks,
            viewer_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of viewers currently holding or awaiting a lock
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one viewer; releasing it drops the map entry once unused
pub struct ViewerGuard<'a> {
    locks: &'a DashMap<Uuid, Arc<Mutex<()>>>,
    viewer_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ViewerGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // The map holds the last reference unless another task is waiting
        self.locks
            .remove_if(&self.viewer_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Connection whose tally had substituted sources
#[derive(Debug, Clone, Serialize)]
pub struct DegradedPair {
    pub connection_id: Uuid,
    pub sources: Vec<SignalSource>,
}

/// Outcome of one viewer's recomputation
#[derive(Debug, Clone, Serialize)]
pub struct RecomputeReport {
    pub viewer_id: Uuid,
    pub connections: usize,
    pub scores_written: usize,
    pub suggestions_created: usize,
    pub suggestions_superseded: usize,
    pub degraded: Vec<DegradedPair>,
    pub duration_ms: u64,
}

impl RecomputeReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Batch job statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub viewers_processed: u32,
    pub viewers_succeeded: u32,
    pub viewers_failed: u32,
    pub viewers_degraded: u32,
    pub suggestions_created: usize,
    pub total_duration_ms: u64,
    pub reports: Vec<RecomputeReport>,
}

pub struct AffinityRecomputeJob {
    config: BatchConfig,
    aggregator: InteractionAggregator,
    calculator: ScoreCalculator,
    generator: RankSuggestionGenerator,
    scores: Arc<dyn ScoreRepository>,
    suggestions: Arc<dyn SuggestionRepository>,
    locks: ViewerLocks,
}

impl AffinityRecomputeJob {
    pub fn new(
        config: &Config,
        log: Arc<dyn InteractionLog>,
        scores: Arc<dyn ScoreRepository>,
        suggestions: Arc<dyn SuggestionRepository>,
    ) -> Self {
        Self {
            config: config.batch.clone(),
            aggregator: InteractionAggregator::new(log, &config.aggregation),
            calculator: ScoreCalculator::new(config.scoring.clone()),
            generator: RankSuggestionGenerator::new(config.suggestions.clone()),
            scores,
            suggestions,
            locks: ViewerLocks::new(),
        }
    }

    /// Run the full pipeline for one viewer.
    /// Connections belonging to other viewers and repeated connection ids are skipped.
    pub async fn run_for_viewer(
        &self,
        viewer_id: Uuid,
        connections: &[Connection],
        now: DateTime<Utc>,
    ) -> Result<RecomputeReport> {
        let _guard = self.locks.acquire(viewer_id).await;
        let start_time = Instant::now();

        let mut seen = HashSet::new();
        let connections: Vec<&Connection> = connections
            .iter()
            .filter(|c| {
                if c.viewer_id != viewer_id {
                    warn!(
                        viewer_id = %viewer_id,
                        connection_id = %c.connection_id,
                        "Skipping connection of another viewer"
                    );
                    return false;
                }
                if !seen.insert(c.connection_id) {
                    warn!(
                        viewer_id = %viewer_id,
                        connection_id = %c.connection_id,
                        "Skipping repeated connection"
                    );
                    return false;
                }
                true
            })
            .collect();

        // Stage 1: aggregate
        let window = self.aggregator.window_ending(now);
        let tallies = join_all(connections.iter().map(|c| async move {
            (
                c.rank,
                self.aggregator
                    .aggregate(viewer_id, c.connection_id, window)
                    .await,
            )
        }))
        .await;

        let degraded: Vec<DegradedPair> = tallies
            .iter()
            .filter(|(_, tally)| tally.is_degraded())
            .map(|(_, tally)| DegradedPair {
                connection_id: tally.connection_id,
                sources: tally.degraded_sources.clone(),
            })
            .collect();

        // Stage 2: score
        let records: Vec<_> = tallies
            .iter()
            .map(|(rank, tally)| self.calculator.score(tally, *rank))
            .collect();
        debug!(viewer_id = %viewer_id, records = records.len(), "Scores computed");

        // Stage 3: persist scores
        let scores_written = records.len();
        self.scores.upsert_scores(viewer_id, records.clone()).await?;

        // Stage 4: suggest
        let fresh = self.generator.generate(viewer_id, &records, now);
        let suggestions_created = fresh.len();

        // Stage 5: atomic replace
        let suggestions_superseded = self.suggestions.replace_pending(viewer_id, fresh).await?;

        let report = RecomputeReport {
            viewer_id,
            connections: connections.len(),
            scores_written,
            suggestions_created,
            suggestions_superseded,
            degraded,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        debug!(
            viewer_id = %viewer_id,
            connections = report.connections,
            created = report.suggestions_created,
            superseded = report.suggestions_superseded,
            degraded = report.degraded.len(),
            duration_ms = report.duration_ms,
            "Viewer recomputed"
        );

        Ok(report)
    }

    /// Recompute every viewer present in `connections`
    pub async fn run_batch(&self, connections: &[Connection], now: DateTime<Utc>) -> BatchSummary {
        let start_time = Instant::now();
        let mut summary = BatchSummary {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let mut by_viewer: BTreeMap<Uuid, Vec<Connection>> = BTreeMap::new();
        for connection in connections {
            by_viewer
                .entry(connection.viewer_id)
                .or_default()
                .push(connection.clone());
        }

        let concurrency = self.config.max_concurrent_viewers.max(1);
        info!(
            viewers = by_viewer.len(),
            connections = connections.len(),
            concurrency,
            "Starting affinity recompute batch"
        );

        let results: Vec<_> = stream::iter(by_viewer)
            .map(|(viewer_id, group)| async move {
                (viewer_id, self.run_for_viewer(viewer_id, &group, now).await)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (viewer_id, result) in results {
            summary.viewers_processed += 1;
            match result {
                Ok(report) => {
                    summary.viewers_succeeded += 1;
                    if report.is_degraded() {
                        summary.viewers_degraded += 1;
                    }
                    summary.suggestions_created += report.suggestions_created;
                    summary.reports.push(report);
                }
                Err(e) => {
                    summary.viewers_failed += 1;
                    error!(viewer_id = %viewer_id, error = %e, "Failed to recompute viewer");
                }
            }
        }
        summary.reports.sort_by_key(|r| r.viewer_id);

        summary.completed_at = Some(Utc::now());
        summary.total_duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            processed = summary.viewers_processed,
            succeeded = summary.viewers_succeeded,
            failed = summary.viewers_failed,
            degraded = summary.viewers_degraded,
            suggestions = summary.suggestions_created,
            duration_ms = summary.total_duration_ms,
            "Affinity recompute batch completed"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CurationError;
    use crate::models::{RankSuggestion, SuggestionStatus};
    use crate::repository::InMemoryStore;
    use crate::services::aggregator::EventLogSnapshot;

    struct BrokenSuggestions;

    #[async_trait::async_trait]
    impl SuggestionRepository for BrokenSuggestions {
        async fn replace_pending(&self, _: Uuid, _: Vec<RankSuggestion>) -> Result<usize> {
            Err(CurationError::Storage("write rejected".into()))
        }

        async fn pending_for_viewer(
            &self,
            _: Uuid,
            _: DateTime<Utc>,
        ) -> Result<Vec<RankSuggestion>> {
            Ok(Vec::new())
        }

        async fn resolve(
            &self,
            id: Uuid,
            _: SuggestionStatus,
            _: DateTime<Utc>,
        ) -> Result<RankSuggestion> {
            Err(CurationError::NotFound(id.to_string()))
        }

        async fn expire_stale(&self, _: DateTime<Utc>) -> Result<usize> {
            Ok(0)
        }
    }

    fn connections(viewer: Uuid, n: u32) -> Vec<Connection> {
        (1..=n)
            .map(|rank| Connection {
                viewer_id: viewer,
                connection_id: Uuid::new_v4(),
                rank,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_viewer_locks_serialize() {
        let locks = ViewerLocks::new();
        let viewer = Uuid::new_v4();
        let guard = locks.acquire(viewer).await;

        // Other viewers are not blocked
        let _other = locks.acquire(Uuid::new_v4()).await;

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            locks.acquire(viewer),
        )
        .await;
        assert!(blocked.is_err());

        drop(guard);
        let _again = locks.acquire(viewer).await;
    }

    #[tokio::test]
    async fn test_viewer_locks_release_entries() {
        let locks = Arc::new(ViewerLocks::new());
        let viewer = Uuid::new_v4();

        let guard = locks.acquire(viewer).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(viewer).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The waiter still needs the entry
        drop(guard);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());

        for _ in 0..10 {
            drop(locks.acquire(Uuid::new_v4()).await);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_empty_log_writes_zero_scores() {
        let store = Arc::new(InMemoryStore::new());
        let job = AffinityRecomputeJob::new(
            &Config::default(),
            Arc::new(EventLogSnapshot::default()),
            store.clone(),
            store.clone(),
        );
        let viewer = Uuid::new_v4();
        let report = job
            .run_for_viewer(viewer, &connections(viewer, 3), Utc::now())
            .await
            .unwrap();

        assert_eq!(report.scores_written, 3);
        // Equal scores keep rank order, so nothing moves
        assert_eq!(report.suggestions_created, 0);
        assert!(!report.is_degraded());
        let scores = store.scores_for_viewer(viewer).await.unwrap();
        assert!(scores.iter().all(|s| s.overall_score == 0.0));
    }

    #[tokio::test]
    async fn test_batch_counts_failures() {
        let store = Arc::new(InMemoryStore::new());
        let job = AffinityRecomputeJob::new(
            &Config::default(),
            Arc::new(EventLogSnapshot::default()),
            store,
            Arc::new(BrokenSuggestions),
        );
        let mut all = connections(Uuid::new_v4(), 2);
        all.extend(connections(Uuid::new_v4(), 2));

        let summary = job.run_batch(&all, Utc::now()).await;
        assert_eq!(summary.viewers_processed, 2);
        assert_eq!(summary.viewers_failed, 2);
        assert!(summary.reports.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_and_repeated_connections_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let job = AffinityRecomputeJob::new(
            &Config::default(),
            Arc::new(EventLogSnapshot::default()),
            store.clone(),
            store,
        );
        let viewer = Uuid::new_v4();
        let mut mine = connections(viewer, 2);
        mine.push(mine[0].clone());
        mine.extend(connections(Uuid::new_v4(), 1));

        let report = job.run_for_viewer(viewer, &mine, Utc::now()).await.unwrap();
        assert_eq!(report.connections, 2);
        assert!(job.locks.is_empty());
    }
}
