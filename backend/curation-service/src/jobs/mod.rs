// ============================================
// Background Jobs Module
// ============================================
//
// Contains batch runners for:
// 1. Affinity recomputation (scores + rank suggestions)
//
// Triggered by the `curation-batch` binary or embedded callers.

pub mod affinity_batch;

pub use affinity_batch::{
    AffinityRecomputeJob, BatchSummary, DegradedPair, RecomputeReport, ViewerLocks,
};
