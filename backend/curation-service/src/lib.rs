pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{CurationError, Result};
pub use jobs::{AffinityRecomputeJob, BatchSummary, RecomputeReport};
pub use repository::{InMemoryStore, ScoreRepository, SuggestionRepository};
pub use services::{
    CurationAssembler, CurationRequest, DiversityLayer, EngagementPredictor, FeedCurator,
    InteractionAggregator, RankSuggestionGenerator, ScoreCalculator,
};
