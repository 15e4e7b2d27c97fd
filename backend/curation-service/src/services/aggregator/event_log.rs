use super::{InteractionLog, TimeWindow};
use crate::error::Result;
use crate::models::{AttendanceRecord, Direction, InteractionEvent, InteractionKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// In-memory interaction log over a snapshot of events and attendance
///
/// Used by the batch binary (snapshot files) and in tests.
#[derive(Debug, Clone, Default)]
pub struct EventLogSnapshot {
    events: Vec<InteractionEvent>,
    attendance: Vec<AttendanceRecord>,
}

impl EventLogSnapshot {
    pub fn new(events: Vec<InteractionEvent>, attendance: Vec<AttendanceRecord>) -> Self {
        Self { events, attendance }
    }

    fn between(
        &self,
        from: Uuid,
        to: Uuid,
    ) -> impl Iterator<Item = &InteractionEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.actor_id == from && e.target_id == to)
    }
}

#[async_trait]
impl InteractionLog for EventLogSnapshot {
    async fn count_interactions(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        kind: InteractionKind,
        direction: Direction,
        window: TimeWindow,
    ) -> Result<u64> {
        let (actor, target) = match direction {
            Direction::Given => (viewer_id, connection_id),
            Direction::Received => (connection_id, viewer_id),
        };
        let count = self
            .between(actor, target)
            .filter(|e| e.kind == kind && window.contains(e.occurred_at))
            .count();
        Ok(count as u64)
    }

    async fn attended_events(&self, user_id: Uuid, window: TimeWindow) -> Result<HashSet<Uuid>> {
        Ok(self
            .attendance
            .iter()
            .filter(|r| window.contains(r.held_at) && r.attendees.contains(&user_id))
            .map(|r| r.event_id)
            .collect())
    }

    async fn time_in_content(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        window: TimeWindow,
    ) -> Result<f64> {
        Ok(self
            .between(viewer_id, connection_id)
            .filter(|e| window.contains(e.occurred_at))
            .filter_map(|e| e.dwell_seconds)
            .filter(|s| s.is_finite() && *s > 0.0)
            .sum())
    }

    async fn average_response_latency(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        window: TimeWindow,
    ) -> Result<Option<f64>> {
        let samples: Vec<f64> = self
            .between(viewer_id, connection_id)
            .filter(|e| window.contains(e.occurred_at))
            .filter_map(|e| e.response_latency_seconds)
            .filter(|s| s.is_finite() && *s >= 0.0)
            .collect();

        if samples.is_empty() {
            return Ok(None);
        }
        Ok(Some(samples.iter().sum::<f64>() / samples.len() as f64))
    }

    async fn last_interaction(
        &self,
        viewer_id: Uuid,
        connection_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .between(viewer_id, connection_id)
            .chain(self.between(connection_id, viewer_id))
            .map(|e| e.occurred_at)
            .filter(|t| *t <= as_of)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(
        kind: InteractionKind,
        actor: Uuid,
        target: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> InteractionEvent {
        InteractionEvent {
            kind,
            actor_id: actor,
            target_id: target,
            occurred_at,
            dwell_seconds: None,
            response_latency_seconds: None,
        }
    }

    #[tokio::test]
    async fn test_counts_respect_direction_and_window() {
        let now = Utc::now();
        let viewer = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let window = TimeWindow::trailing(now, Duration::days(30));

        let log = EventLogSnapshot::new(
            vec![
                event(InteractionKind::Message, viewer, friend, now - Duration::days(1)),
                event(InteractionKind::Message, viewer, friend, now - Duration::days(2)),
                event(InteractionKind::Message, friend, viewer, now - Duration::days(3)),
                // Outside the window
                event(InteractionKind::Message, viewer, friend, now - Duration::days(31)),
                // Exactly on the window start is excluded
                event(InteractionKind::Message, viewer, friend, window.start),
                // Someone else
                event(InteractionKind::Message, viewer, stranger, now - Duration::days(1)),
            ],
            vec![],
        );

        let given = log
            .count_interactions(viewer, friend, InteractionKind::Message, Direction::Given, window)
            .await
            .unwrap();
        let received = log
            .count_interactions(
                viewer,
                friend,
                InteractionKind::Message,
                Direction::Received,
                window,
            )
            .await
            .unwrap();

        assert_eq!(given, 2);
        assert_eq!(received, 1);
    }

    #[tokio::test]
    async fn test_attendance_is_per_user_event_set() {
        let now = Utc::now();
        let viewer = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let window = TimeWindow::trailing(now, Duration::days(30));
        let meetup = Uuid::new_v4();
        let old_meetup = Uuid::new_v4();

        let log = EventLogSnapshot::new(
            vec![],
            vec![
                AttendanceRecord {
                    event_id: meetup,
                    held_at: now - Duration::days(5),
                    attendees: HashSet::from([viewer, friend]),
                },
                AttendanceRecord {
                    event_id: old_meetup,
                    held_at: now - Duration::days(60),
                    attendees: HashSet::from([viewer, friend]),
                },
            ],
        );

        let events = log.attended_events(viewer, window).await.unwrap();
        assert_eq!(events, HashSet::from([meetup]));
    }

    #[tokio::test]
    async fn test_time_latency_and_last_interaction() {
        let now = Utc::now();
        let viewer = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let window = TimeWindow::trailing(now, Duration::days(30));

        let mut view = event(InteractionKind::StoryView, viewer, friend, now - Duration::days(2));
        view.dwell_seconds = Some(120.0);
        let mut reply = event(InteractionKind::Message, viewer, friend, now - Duration::days(4));
        reply.response_latency_seconds = Some(30.0);
        reply.dwell_seconds = Some(f64::NAN);
        let mut reply2 = event(InteractionKind::Message, viewer, friend, now - Duration::days(6));
        reply2.response_latency_seconds = Some(90.0);
        let latest = event(InteractionKind::Reaction, friend, viewer, now - Duration::hours(3));

        let log = EventLogSnapshot::new(vec![view, reply, reply2, latest], vec![]);

        assert_eq!(log.time_in_content(viewer, friend, window).await.unwrap(), 120.0);
        assert_eq!(
            log.average_response_latency(viewer, friend, window)
                .await
                .unwrap(),
            Some(60.0)
        );
        assert_eq!(
            log.last_interaction(viewer, friend, now).await.unwrap(),
            Some(now - Duration::hours(3))
        );
    }
}
