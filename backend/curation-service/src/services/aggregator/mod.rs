// ============================================
// Interaction Aggregator
// ============================================
//
// Builds one InteractionTally per (viewer, connection) from independent
// signal sources. Each source call is time-bounded; a source that fails or
// times out contributes zero and is recorded in `degraded_sources`, so one
// unavailable source never blanks the whole tally.

mod event_log;

pub use event_log::EventLogSnapshot;

use crate::config::AggregationConfig;
use crate::error::Result;
use crate::models::{Direction, InteractionKind, InteractionTally, SignalSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Half-open aggregation window: `start < t <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window of `length` ending at `end`
    pub fn trailing(end: DateTime<Utc>, length: chrono::Duration) -> Self {
        Self {
            start: end
                .checked_sub_signed(length)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t > self.start && t <= self.end
    }
}

/// Source of raw interaction signals, one method per signal family
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InteractionLog: Send + Sync {
    /// Events of `kind` between the pair in `direction` within the window
    async fn count_interactions(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        kind: InteractionKind,
        direction: Direction,
        window: TimeWindow,
    ) -> Result<u64>;

    /// Ids of events/meetups `user_id` attended that were held within the window
    async fn attended_events(&self, user_id: Uuid, window: TimeWindow) -> Result<HashSet<Uuid>>;

    /// Seconds the viewer spent on the connection's content within the window
    async fn time_in_content(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        window: TimeWindow,
    ) -> Result<f64>;

    /// Mean seconds the viewer takes to respond to the connection
    async fn average_response_latency(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        window: TimeWindow,
    ) -> Result<Option<f64>>;

    /// Most recent interaction in either direction at or before `as_of`
    async fn last_interaction(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;
}

pub struct InteractionAggregator {
    log: Arc<dyn InteractionLog>,
    timeout: Duration,
    window_length: chrono::Duration,
}

impl InteractionAggregator {
    pub fn new(log: Arc<dyn InteractionLog>, config: &AggregationConfig) -> Self {
        Self {
            log,
            timeout: config.source_timeout(),
            window_length: config.window(),
        }
    }

    /// Trailing window ending at `now`
    pub fn window_ending(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::trailing(now, self.window_length)
    }

    /// Tally every signal for the pair. Never fails: unavailable sources count as zero.
    pub async fn aggregate(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        window: TimeWindow,
    ) -> InteractionTally {
        let mut tally = InteractionTally::empty(viewer_id, connection_id, window.start, window.end);
        let mut degraded: Vec<SignalSource> = Vec::new();

        let directional = InteractionKind::ALL
            .iter()
            .flat_map(|kind| [(*kind, Direction::Given), (*kind, Direction::Received)]);

        let counts = join_all(directional.map(|(kind, direction)| async move {
            let source = SignalSource::Interactions(kind, direction);
            let count = self
                .guarded(
                    viewer_id,
                    connection_id,
                    source,
                    self.log
                        .count_interactions(viewer_id, connection_id, kind, direction, window),
                )
                .await;
            (kind, direction, count)
        }))
        .await;

        for (kind, direction, count) in counts {
            match count {
                Some(n) => {
                    let slot = tally.count_mut(kind);
                    match direction {
                        Direction::Given => slot.given = n,
                        Direction::Received => slot.received = n,
                    }
                }
                None => degraded.push(SignalSource::Interactions(kind, direction)),
            }
        }

        let (viewer_events, connection_events, time_spent, latency, last) = tokio::join!(
            self.guarded(
                viewer_id,
                connection_id,
                SignalSource::Attendance,
                self.log.attended_events(viewer_id, window),
            ),
            self.guarded(
                viewer_id,
                connection_id,
                SignalSource::Attendance,
                self.log.attended_events(connection_id, window),
            ),
            self.guarded(
                viewer_id,
                connection_id,
                SignalSource::TimeInContent,
                self.log.time_in_content(viewer_id, connection_id, window),
            ),
            self.guarded(
                viewer_id,
                connection_id,
                SignalSource::ResponseLatency,
                self.log
                    .average_response_latency(viewer_id, connection_id, window),
            ),
            self.guarded(
                viewer_id,
                connection_id,
                SignalSource::LastInteraction,
                self.log.last_interaction(viewer_id, connection_id, window.end),
            ),
        );

        match (viewer_events, connection_events) {
            (Some(mine), Some(theirs)) => {
                tally.co_attended_events = mine.intersection(&theirs).count() as u64;
            }
            _ => degraded.push(SignalSource::Attendance),
        }

        match time_spent {
            Some(secs) if secs.is_finite() && secs > 0.0 => tally.time_in_content_secs = secs,
            Some(_) => {}
            None => degraded.push(SignalSource::TimeInContent),
        }

        match latency {
            Some(value) => {
                tally.avg_response_latency_secs = value.filter(|v| v.is_finite() && *v >= 0.0)
            }
            None => degraded.push(SignalSource::ResponseLatency),
        }

        match last {
            Some(value) => tally.last_interaction_at = value.filter(|t| *t <= window.end),
            None => degraded.push(SignalSource::LastInteraction),
        }

        debug!(
            viewer_id = %viewer_id,
            connection_id = %connection_id,
            interactions = tally.interaction_count(),
            degraded = degraded.len(),
            "Interaction tally aggregated"
        );

        tally.degraded_sources = degraded;
        tally
    }

    /// Run one source call under the timeout; `None` means the source is unavailable
    async fn guarded<T, F>(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        source: SignalSource,
        future: F,
    ) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(
                    viewer_id = %viewer_id,
                    connection_id = %connection_id,
                    source = %source,
                    error = %e,
                    "Interaction source failed, counting as zero"
                );
                None
            }
            Err(_) => {
                warn!(
                    viewer_id = %viewer_id,
                    connection_id = %connection_id,
                    source = %source,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Interaction source timed out, counting as zero"
                );
                None
            }
        }
    }
}
