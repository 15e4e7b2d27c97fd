/// Rank Suggestion Generator
///
/// Orders a viewer's connections by overall score and proposes a new rank
/// wherever the score order differs from the manual rank by at least
/// `min_rank_delta`. Demotions that only follow from another connection
/// sliding down are implied and not proposed.
///
/// The primary reason is picked by a fixed cascade over the observed signals;
/// messaging wins over reactions/comments, which win over time spent, which
/// wins over shared attendance.
use crate::config::SuggestionConfig;
use crate::models::{
    RankSuggestion, ScoreRecord, SignalSnapshot, SuggestionReason, SuggestionStatus,
    SupportingMetrics,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RankSuggestionGenerator {
    config: SuggestionConfig,
}

impl Default for RankSuggestionGenerator {
    fn default() -> Self {
        Self::new(SuggestionConfig::default())
    }
}

impl RankSuggestionGenerator {
    pub fn new(config: SuggestionConfig) -> Self {
        Self { config }
    }

    /// Build suggestions for one viewer. Records for other viewers are ignored.
    pub fn generate(
        &self,
        viewer_id: Uuid,
        records: &[ScoreRecord],
        now: DateTime<Utc>,
    ) -> Vec<RankSuggestion> {
        let mut ordered: Vec<&ScoreRecord> = records
            .iter()
            .filter(|r| {
                let mine = r.viewer_id == viewer_id;
                if !mine {
                    warn!(
                        viewer_id = %viewer_id,
                        other_viewer = %r.viewer_id,
                        "Skipping score record that belongs to another viewer"
                    );
                }
                mine
            })
            .collect();

        // Stable: equal scores keep input order
        ordered.sort_by(|a, b| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let promoted = |position: usize| {
            ordered
                .get(position)
                .is_some_and(|r| r.current_rank > position as u32 + 1)
        };

        let suggestions: Vec<RankSuggestion> = ordered
            .iter()
            .enumerate()
            .filter_map(|(position, record)| {
                let suggested_rank = position as u32 + 1;
                let delta = record.current_rank.abs_diff(suggested_rank);
                if delta < self.config.min_rank_delta {
                    return None;
                }
                // A demotion is only proposed when a promoted connection takes the slot
                let moving_down = suggested_rank > record.current_rank;
                let slot = record.current_rank.checked_sub(1);
                if moving_down && !slot.is_some_and(|slot| promoted(slot as usize)) {
                    return None;
                }
                Some(self.build(record, suggested_rank, delta, now))
            })
            .collect();

        debug!(
            viewer_id = %viewer_id,
            connections = records.len(),
            suggestions = suggestions.len(),
            "Rank suggestions generated"
        );

        suggestions
    }

    pub fn confidence(&self, rank_delta: u32) -> u8 {
        let raw = u32::from(self.config.base_confidence)
            .saturating_add(u32::from(self.config.confidence_step).saturating_mul(rank_delta));
        raw.min(u32::from(self.config.max_confidence)) as u8
    }

    fn build(
        &self,
        record: &ScoreRecord,
        suggested_rank: u32,
        delta: u32,
        now: DateTime<Utc>,
    ) -> RankSuggestion {
        let moving_closer = suggested_rank < record.current_rank;
        let (reason, justification) = classify(&record.signals, moving_closer);

        RankSuggestion {
            id: Uuid::new_v4(),
            viewer_id: record.viewer_id,
            connection_id: record.connection_id,
            current_rank: record.current_rank,
            suggested_rank,
            confidence: self.confidence(delta),
            reason,
            justification,
            metrics: SupportingMetrics {
                overall_score: record.overall_score,
                interaction_score: record.interaction_score,
                consistency_score: record.consistency_score,
                engagement_score: record.engagement_score,
                signals: record.signals.clone(),
            },
            status: SuggestionStatus::Pending,
            created_at: now,
            expires_at: now
                .checked_add_signed(self.config.ttl())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Primary reason cascade
pub fn classify(signals: &SignalSnapshot, moving_closer: bool) -> (SuggestionReason, String) {
    if signals.messages > 0 {
        return (
            SuggestionReason::FrequentCommunication,
            format!("You exchanged {} messages recently", signals.messages),
        );
    }

    let reactions_and_comments = signals.reactions + signals.comments;
    if reactions_and_comments > 0 {
        return (
            SuggestionReason::HighEngagement,
            format!(
                "You reacted to or commented on each other's content {} times",
                reactions_and_comments
            ),
        );
    }

    if signals.time_in_content_secs > 0.0 {
        let minutes = (signals.time_in_content_secs / 60.0).round().max(1.0);
        return (
            SuggestionReason::HighEngagement,
            format!("You spent about {} minutes with their content", minutes as u64),
        );
    }

    if signals.co_attended_events > 0 {
        return (
            SuggestionReason::InPersonConnection,
            format!("You attended {} events together", signals.co_attended_events),
        );
    }

    let justification = if moving_closer {
        "Your overall activity with this connection has picked up".to_string()
    } else {
        "You have interacted with this connection less lately".to_string()
    };
    (SuggestionReason::GeneralActivity, justification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(viewer: Uuid, rank: u32, overall: f64, signals: SignalSnapshot) -> ScoreRecord {
        ScoreRecord {
            viewer_id: viewer,
            connection_id: Uuid::new_v4(),
            interaction_score: overall,
            consistency_score: overall,
            engagement_score: overall,
            overall_score: overall,
            current_rank: rank,
            signals,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_reorders_by_overall_score() {
        let viewer = Uuid::new_v4();
        let records = vec![
            record(viewer, 1, 90.0, SignalSnapshot::default()),
            record(viewer, 2, 40.0, SignalSnapshot::default()),
            record(viewer, 3, 95.0, SignalSnapshot::default()),
        ];
        let now = Utc::now();

        let suggestions = RankSuggestionGenerator::default().generate(viewer, &records, now);

        assert_eq!(suggestions.len(), 2);
        let to_first = suggestions
            .iter()
            .find(|s| s.connection_id == records[2].connection_id)
            .unwrap();
        assert_eq!((to_first.current_rank, to_first.suggested_rank), (3, 1));
        assert_eq!(to_first.confidence, 70);
        let to_second = suggestions
            .iter()
            .find(|s| s.connection_id == records[0].connection_id)
            .unwrap();
        assert_eq!((to_second.current_rank, to_second.suggested_rank), (1, 2));
        assert_eq!(to_second.confidence, 60);
        assert!(suggestions
            .iter()
            .all(|s| s.connection_id != records[1].connection_id));
        assert!(suggestions.iter().all(|s| s.expires_at == now + Duration::days(7)));
        assert!(suggestions.iter().all(|s| s.status == SuggestionStatus::Pending));
    }

    #[test]
    fn test_expiry_saturates_for_oversized_ttl() {
        let viewer = Uuid::new_v4();
        let records = vec![
            record(viewer, 1, 10.0, SignalSnapshot::default()),
            record(viewer, 2, 90.0, SignalSnapshot::default()),
        ];
        let generator = RankSuggestionGenerator::new(SuggestionConfig {
            ttl_days: i64::MAX,
            ..SuggestionConfig::default()
        });

        let suggestions = generator.generate(viewer, &records, Utc::now());

        assert!(!suggestions.is_empty());
        assert!(suggestions
            .iter()
            .all(|s| s.expires_at == DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_full_reversal_moves_everyone() {
        let viewer = Uuid::new_v4();
        let records: Vec<ScoreRecord> = (1..=4)
            .map(|rank| record(viewer, rank, f64::from(rank) * 10.0, SignalSnapshot::default()))
            .collect();
        let suggestions = RankSuggestionGenerator::default().generate(viewer, &records, Utc::now());

        assert_eq!(suggestions.len(), 4);
        let moves: Vec<(u32, u32)> = suggestions
            .iter()
            .map(|s| (s.current_rank, s.suggested_rank))
            .collect();
        assert!(moves.contains(&(1, 4)));
        assert!(moves.contains(&(2, 3)));
    }

    #[test]
    fn test_demotion_into_promoted_slot() {
        let viewer = Uuid::new_v4();
        // Rank 3 overtakes rank 2 only
        let records = vec![
            record(viewer, 1, 50.0, SignalSnapshot::default()),
            record(viewer, 2, 10.0, SignalSnapshot::default()),
            record(viewer, 3, 40.0, SignalSnapshot::default()),
        ];
        let suggestions = RankSuggestionGenerator::default().generate(viewer, &records, Utc::now());
        let mut moves: Vec<(u32, u32)> = suggestions
            .iter()
            .map(|s| (s.current_rank, s.suggested_rank))
            .collect();
        moves.sort();
        assert_eq!(moves, vec![(2, 3), (3, 2)]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let viewer = Uuid::new_v4();
        let records = vec![
            record(viewer, 1, 50.0, SignalSnapshot::default()),
            record(viewer, 2, 50.0, SignalSnapshot::default()),
        ];
        let suggestions = RankSuggestionGenerator::default().generate(viewer, &records, Utc::now());
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_confidence_is_capped() {
        let generator = RankSuggestionGenerator::default();
        assert_eq!(generator.confidence(1), 60);
        assert_eq!(generator.confidence(4), 90);
        assert_eq!(generator.confidence(5), 95);
        assert_eq!(generator.confidence(27), 95);
        assert_eq!(generator.confidence(u32::MAX), 95);
    }

    #[test]
    fn test_min_rank_delta() {
        let viewer = Uuid::new_v4();
        let records = vec![
            record(viewer, 1, 10.0, SignalSnapshot::default()),
            record(viewer, 2, 20.0, SignalSnapshot::default()),
        ];
        let generator = RankSuggestionGenerator::new(SuggestionConfig {
            min_rank_delta: 2,
            ..Default::default()
        });
        assert!(generator.generate(viewer, &records, Utc::now()).is_empty());
    }

    #[test]
    fn test_reason_cascade() {
        let all = SignalSnapshot {
            messages: 3,
            reactions: 2,
            time_in_content_secs: 600.0,
            co_attended_events: 1,
            ..Default::default()
        };
        assert_eq!(classify(&all, true).0, SuggestionReason::FrequentCommunication);

        let no_messages = SignalSnapshot {
            messages: 0,
            ..all.clone()
        };
        assert_eq!(classify(&no_messages, true).0, SuggestionReason::HighEngagement);

        let time_only = SignalSnapshot {
            time_in_content_secs: 600.0,
            co_attended_events: 1,
            ..Default::default()
        };
        let (reason, text) = classify(&time_only, true);
        assert_eq!(reason, SuggestionReason::HighEngagement);
        assert!(text.contains("10 minutes"));

        let met_only = SignalSnapshot {
            co_attended_events: 2,
            ..Default::default()
        };
        assert_eq!(classify(&met_only, false).0, SuggestionReason::InPersonConnection);

        let (up, up_text) = classify(&SignalSnapshot::default(), true);
        let (down, down_text) = classify(&SignalSnapshot::default(), false);
        assert_eq!(up, SuggestionReason::GeneralActivity);
        assert_eq!(down, SuggestionReason::GeneralActivity);
        assert_ne!(up_text, down_text);
    }

    #[test]
    fn test_foreign_records_ignored() {
        let viewer = Uuid::new_v4();
        let records = vec![
            record(Uuid::new_v4(), 1, 10.0, SignalSnapshot::default()),
            record(viewer, 2, 20.0, SignalSnapshot::default()),
        ];
        let suggestions = RankSuggestionGenerator::default().generate(viewer, &records, Utc::now());
        // Only the viewer's record remains and it moves from 2 to 1
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].suggested_rank, 1);
    }
}
