pub mod aggregator;
pub mod curation;
pub mod diversity;
pub mod prediction;
pub mod scoring;
pub mod suggestions;

pub use aggregator::{EventLogSnapshot, InteractionAggregator, InteractionLog, TimeWindow};
pub use curation::{CompositeScorer, CurationAssembler, CurationRequest, FeedCurator};
pub use diversity::DiversityLayer;
pub use prediction::{EngagementHistorySource, EngagementPredictor, StaticHistorySource};
pub use scoring::ScoreCalculator;
pub use suggestions::RankSuggestionGenerator;
