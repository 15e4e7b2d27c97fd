/// Score Calculator
///
/// Converts an InteractionTally into three sub-scores and their mean:
/// - **interaction**: weighted sum of interaction counts
/// - **consistency**: 100 within the grace period, then exponential decay
/// - **engagement**: mean of capped total time and capped time per interaction (0-100)
///
/// Scoring is a pure function of the tally and the configured weights. The
/// tally's window end is the reference "now", so recomputing from the same
/// tally yields identical records.
use crate::config::ScoringConfig;
use crate::models::{InteractionKind, InteractionTally, ScoreRecord, SignalSnapshot};
use crate::utils::{capped_ratio, days_between, decay_after_grace};

const MAX_SUBSCORE: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    config: ScoringConfig,
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ScoreCalculator {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, tally: &InteractionTally, current_rank: u32) -> ScoreRecord {
        let days_since_last = tally
            .last_interaction_at
            .map(|t| days_between(t, tally.window_end));

        let interaction_score = self.interaction_score(tally);
        let consistency_score = self.consistency_score(days_since_last);
        let engagement_score = self.engagement_score(tally);
        let overall_score = (interaction_score + consistency_score + engagement_score) / 3.0;

        ScoreRecord {
            viewer_id: tally.viewer_id,
            connection_id: tally.connection_id,
            interaction_score,
            consistency_score,
            engagement_score,
            overall_score,
            current_rank,
            signals: SignalSnapshot {
                messages: tally.messages.total(),
                reactions: tally.reactions.total(),
                comments: tally.comments.total(),
                story_views: tally.story_views.total(),
                co_attended_events: tally.co_attended_events,
                time_in_content_secs: tally.time_in_content_secs,
                avg_response_latency_secs: tally.avg_response_latency_secs,
                days_since_last_interaction: days_since_last,
            },
            computed_at: tally.window_end,
        }
    }

    pub fn interaction_score(&self, tally: &InteractionTally) -> f64 {
        let weights = &self.config.weights;
        let routine: f64 = InteractionKind::ALL
            .iter()
            .map(|kind| tally.count(*kind).total() as f64 * weights.weight(*kind))
            .sum();
        let in_person = tally.co_attended_events as f64 * weights.co_attendance;

        (routine + in_person).max(0.0)
    }

    /// `None` means no interaction has ever been observed
    pub fn consistency_score(&self, days_since_last: Option<f64>) -> f64 {
        match days_since_last {
            Some(days) if days.is_finite() => {
                let factor = decay_after_grace(
                    days.max(0.0),
                    self.config.consistency_grace_days,
                    self.config.consistency_decay_days,
                );
                (MAX_SUBSCORE * factor).max(0.0)
            }
            _ => 0.0,
        }
    }

    pub fn engagement_score(&self, tally: &InteractionTally) -> f64 {
        let count = tally.interaction_count();
        let time = tally.time_in_content_secs;
        if count == 0 || !time.is_finite() || time <= 0.0 {
            return 0.0;
        }

        let total_measure = capped_ratio(time, self.config.total_time_cap_secs);
        let per_interaction_measure =
            capped_ratio(time / count as f64, self.config.per_interaction_cap_secs);

        MAX_SUBSCORE * (total_measure + per_interaction_measure) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn empty_tally() -> InteractionTally {
        let end = Utc::now();
        InteractionTally::empty(Uuid::new_v4(), Uuid::new_v4(), end - Duration::days(30), end)
    }

    #[test]
    fn test_all_zero_tally_scores_zero() {
        let record = ScoreCalculator::default().score(&empty_tally(), 3);

        assert_eq!(record.interaction_score, 0.0);
        assert_eq!(record.consistency_score, 0.0);
        assert_eq!(record.engagement_score, 0.0);
        assert_eq!(record.overall_score, 0.0);
        assert!(!record.overall_score.is_nan());
    }

    #[test]
    fn test_interaction_weights() {
        let mut tally = empty_tally();
        tally.messages.given = 2; // 2 * 3.0
        tally.messages.received = 1; // 1 * 3.0
        tally.reactions.received = 4; // 4 * 1.0
        tally.story_views.given = 2; // 2 * 0.5
        tally.co_attended_events = 1; // 1 * 5.0

        let score = ScoreCalculator::default().interaction_score(&tally);
        assert!((score - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_co_attendance_outweighs_messaging() {
        let calc = ScoreCalculator::default();
        let mut met = empty_tally();
        met.co_attended_events = 1;
        let mut texted = empty_tally();
        texted.messages.given = 1;

        assert!(calc.interaction_score(&met) > calc.interaction_score(&texted));
    }

    #[test]
    fn test_consistency_grace_and_decay() {
        let calc = ScoreCalculator::default();
        assert_eq!(calc.consistency_score(Some(0.0)), 100.0);
        assert_eq!(calc.consistency_score(Some(7.0)), 100.0);
        let after_one_tau = calc.consistency_score(Some(21.0));
        assert!((after_one_tau - 100.0 * (-1.0f64).exp()).abs() < 1e-9);
        assert!(calc.consistency_score(Some(365.0)) < 0.01);
        assert_eq!(calc.consistency_score(None), 0.0);
        // Clock skew: a future timestamp is treated as today
        assert_eq!(calc.consistency_score(Some(-2.0)), 100.0);
    }

    #[test]
    fn test_engagement_caps() {
        let calc = ScoreCalculator::default();
        let mut tally = empty_tally();
        tally.messages.given = 10;
        tally.time_in_content_secs = 1800.0;

        // total: 1800/3600 = 0.5; per interaction: 180s capped at 30s = 1.0
        assert!((calc.engagement_score(&tally) - 75.0).abs() < 1e-9);

        tally.time_in_content_secs = 100_000.0;
        assert_eq!(calc.engagement_score(&tally), 100.0);
    }

    #[test]
    fn test_engagement_zero_without_interactions() {
        let calc = ScoreCalculator::default();
        let mut tally = empty_tally();
        tally.time_in_content_secs = 500.0;
        assert_eq!(calc.engagement_score(&tally), 0.0);
    }

    #[test]
    fn test_overall_is_mean_and_idempotent() {
        let calc = ScoreCalculator::default();
        let mut tally = empty_tally();
        tally.messages.given = 3;
        tally.comments.received = 2;
        tally.time_in_content_secs = 240.0;
        tally.last_interaction_at = Some(tally.window_end - Duration::days(10));

        let first = calc.score(&tally, 2);
        let second = calc.score(&tally, 2);

        assert_eq!(first, second);
        let mean =
            (first.interaction_score + first.consistency_score + first.engagement_score) / 3.0;
        assert!((first.overall_score - mean).abs() < 1e-12);
        assert_eq!(first.signals.messages, 3);
        assert_eq!(first.signals.days_since_last_interaction, Some(10.0));
    }

    proptest! {
        #[test]
        fn prop_consistency_non_increasing(a in 0.0f64..1000.0, b in 0.0f64..1000.0) {
            let calc = ScoreCalculator::default();
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(calc.consistency_score(Some(near)) >= calc.consistency_score(Some(far)));
        }

        #[test]
        fn prop_scores_finite_and_non_negative(
            messages in 0u64..10_000,
            reactions in 0u64..10_000,
            meetups in 0u64..100,
            time in 0.0f64..1e7,
        ) {
            let mut tally = empty_tally();
            tally.messages.given = messages;
            tally.reactions.received = reactions;
            tally.co_attended_events = meetups;
            tally.time_in_content_secs = time;

            let record = ScoreCalculator::default().score(&tally, 1);
            prop_assert!(record.overall_score.is_finite());
            prop_assert!(record.overall_score >= 0.0);
            prop_assert!(record.engagement_score <= 100.0);
        }
    }
}
