use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

// ============================================
// Social graph & interaction inputs
// ============================================

/// A viewer's connection with its manually assigned closeness rank (1 = closest)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub viewer_id: Uuid,
    pub connection_id: Uuid,
    pub rank: u32,
}

/// Routine interaction kinds tracked per direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Message,
    Reaction,
    Comment,
    StoryView,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 4] = [
        InteractionKind::Message,
        InteractionKind::Reaction,
        InteractionKind::Comment,
        InteractionKind::StoryView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Message => "message",
            InteractionKind::Reaction => "reaction",
            InteractionKind::Comment => "comment",
            InteractionKind::StoryView => "story_view",
        }
    }
}

/// Direction relative to the viewer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Viewer acted on the connection
    Given,
    /// Connection acted on the viewer
    Received,
}

/// A raw interaction event as delivered by the event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub actor_id: Uuid,
    pub target_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    /// Seconds the actor spent on the target's content, when measured
    #[serde(default)]
    pub dwell_seconds: Option<f64>,
    /// Seconds between receiving something and this response, when measured
    #[serde(default)]
    pub response_latency_seconds: Option<f64>,
}

/// An event or meetup and who attended it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub event_id: Uuid,
    pub held_at: DateTime<Utc>,
    pub attendees: HashSet<Uuid>,
}

/// Signal families fetched independently during aggregation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Interactions(InteractionKind, Direction),
    Attendance,
    TimeInContent,
    ResponseLatency,
    LastInteraction,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Interactions(kind, Direction::Given) => {
                write!(f, "{}_given", kind.as_str())
            }
            SignalSource::Interactions(kind, Direction::Received) => {
                write!(f, "{}_received", kind.as_str())
            }
            SignalSource::Attendance => f.write_str("attendance"),
            SignalSource::TimeInContent => f.write_str("time_in_content"),
            SignalSource::ResponseLatency => f.write_str("response_latency"),
            SignalSource::LastInteraction => f.write_str("last_interaction"),
        }
    }
}

// ============================================
// Tallies & scores
// ============================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectionalCount {
    pub given: u64,
    pub received: u64,
}

impl DirectionalCount {
    pub fn total(&self) -> u64 {
        self.given + self.received
    }
}

/// Aggregated interaction counts for one (viewer, connection) pair over a window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionTally {
    pub viewer_id: Uuid,
    pub connection_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub messages: DirectionalCount,
    pub reactions: DirectionalCount,
    pub comments: DirectionalCount,
    pub story_views: DirectionalCount,
    /// Distinct events both sides attended within the window
    pub co_attended_events: u64,
    pub time_in_content_secs: f64,
    pub avg_response_latency_secs: Option<f64>,
    pub last_interaction_at: Option<DateTime<Utc>>,
    /// Sources that failed or timed out and were counted as zero
    #[serde(default)]
    pub degraded_sources: Vec<SignalSource>,
}

impl InteractionTally {
    /// A tally with nothing observed
    pub fn empty(
        viewer_id: Uuid,
        connection_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self {
            viewer_id,
            connection_id,
            window_start,
            window_end,
            messages: DirectionalCount::default(),
            reactions: DirectionalCount::default(),
            comments: DirectionalCount::default(),
            story_views: DirectionalCount::default(),
            co_attended_events: 0,
            time_in_content_secs: 0.0,
            avg_response_latency_secs: None,
            last_interaction_at: None,
            degraded_sources: Vec::new(),
        }
    }

    pub fn count(&self, kind: InteractionKind) -> DirectionalCount {
        match kind {
            InteractionKind::Message => self.messages,
            InteractionKind::Reaction => self.reactions,
            InteractionKind::Comment => self.comments,
            InteractionKind::StoryView => self.story_views,
        }
    }

    pub fn count_mut(&mut self, kind: InteractionKind) -> &mut DirectionalCount {
        match kind {
            InteractionKind::Message => &mut self.messages,
            InteractionKind::Reaction => &mut self.reactions,
            InteractionKind::Comment => &mut self.comments,
            InteractionKind::StoryView => &mut self.story_views,
        }
    }

    /// Routine interactions plus shared attendance
    pub fn interaction_count(&self) -> u64 {
        InteractionKind::ALL
            .iter()
            .map(|k| self.count(*k).total())
            .sum::<u64>()
            + self.co_attended_events
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_sources.is_empty()
    }
}

/// Headline counts carried from the tally into scores and suggestions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SignalSnapshot {
    pub messages: u64,
    pub reactions: u64,
    pub comments: u64,
    pub story_views: u64,
    pub co_attended_events: u64,
    pub time_in_content_secs: f64,
    pub avg_response_latency_secs: Option<f64>,
    pub days_since_last_interaction: Option<f64>,
}

/// Closeness scores for one (viewer, connection) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    pub viewer_id: Uuid,
    pub connection_id: Uuid,
    pub interaction_score: f64,
    pub consistency_score: f64,
    pub engagement_score: f64,
    pub overall_score: f64,
    /// Manual rank at computation time
    pub current_rank: u32,
    pub signals: SignalSnapshot,
    pub computed_at: DateTime<Utc>,
}

// ============================================
// Rank suggestions
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionReason {
    FrequentCommunication,
    HighEngagement,
    InPersonConnection,
    GeneralActivity,
}

impl SuggestionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionReason::FrequentCommunication => "frequent_communication",
            SuggestionReason::HighEngagement => "high_engagement",
            SuggestionReason::InPersonConnection => "in_person_connection",
            SuggestionReason::GeneralActivity => "general_activity",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Dismissed,
    Expired,
}

/// Metrics shown next to a suggestion so the viewer can see why it was made
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportingMetrics {
    pub overall_score: f64,
    pub interaction_score: f64,
    pub consistency_score: f64,
    pub engagement_score: f64,
    pub signals: SignalSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankSuggestion {
    pub id: Uuid,
    pub viewer_id: Uuid,
    pub connection_id: Uuid,
    pub current_rank: u32,
    pub suggested_rank: u32,
    /// 0-100
    pub confidence: u8,
    pub reason: SuggestionReason,
    pub justification: String,
    pub metrics: SupportingMetrics,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RankSuggestion {
    /// Pending and not past its expiry
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SuggestionStatus::Pending && self.expires_at > now
    }

    pub fn rank_delta(&self) -> u32 {
        self.current_rank.abs_diff(self.suggested_rank)
    }
}

// ============================================
// Feed candidates
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    Poll,
    Event,
    Broadcast,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Post,
        ContentKind::Poll,
        ContentKind::Event,
        ContentKind::Broadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Poll => "poll",
            ContentKind::Event => "event",
            ContentKind::Broadcast => "broadcast",
        }
    }

    /// Kinds whose body is the content itself
    pub fn requires_body(&self) -> bool {
        matches!(self, ContentKind::Post | ContentKind::Broadcast)
    }
}

/// A content item as it arrives from the content feed, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCandidateItem {
    pub id: Option<Uuid>,
    pub kind: Option<ContentKind>,
    pub author_id: Option<Uuid>,
    pub body: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub id: Uuid,
    pub kind: ContentKind,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CurationType {
    CloseConnection,
    HighEngagement,
    Fresh,
    Discovery,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CuratedItem {
    pub item: CandidateItem,
    pub relevance_score: f64,
    pub engagement_prediction: f64,
    pub rank_weight: f64,
    pub diversity_boost: f64,
    pub final_score: f64,
    pub curation_type: CurationType,
}

/// Per-request counters describing what curation dropped and why
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurationStats {
    pub input_count: usize,
    pub malformed_count: usize,
    pub author_capped_count: usize,
    pub kind_capped_count: usize,
    pub diversity_kept_count: usize,
    pub rebalanced_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CuratedPage {
    pub items: Vec<CuratedItem>,
    pub has_more: bool,
    pub total_pages: usize,
    pub page: usize,
    pub stats: CurationStats,
}
