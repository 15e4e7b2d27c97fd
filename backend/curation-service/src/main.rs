use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use curation_service::{
    models::{AttendanceRecord, Connection, InteractionEvent, RankSuggestion},
    repository::{InMemoryStore, SuggestionRepository},
    services::EventLogSnapshot,
    AffinityRecomputeJob, BatchSummary, Config,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Interaction snapshot consumed by one batch run
#[derive(Debug, Deserialize)]
struct Snapshot {
    connections: Vec<Connection>,
    #[serde(default)]
    events: Vec<InteractionEvent>,
    #[serde(default)]
    attendance: Vec<AttendanceRecord>,
    /// Recompute as of this instant instead of the wall clock
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct BatchOutput {
    summary: BatchSummary,
    suggestions: BTreeMap<Uuid, Vec<RankSuggestion>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env().context("Failed to load curation config")?;

    let snapshot_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CURATION_SNAPSHOT_PATH").ok())
        .context("Usage: curation-batch <snapshot.json> (or set CURATION_SNAPSHOT_PATH)")?;
    let raw = std::fs::read_to_string(&snapshot_path)
        .with_context(|| format!("Failed to read snapshot {}", snapshot_path))?;
    let snapshot: Snapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse snapshot {}", snapshot_path))?;
    let now = snapshot.now.unwrap_or_else(Utc::now);

    info!(
        path = %snapshot_path,
        connections = snapshot.connections.len(),
        events = snapshot.events.len(),
        attendance = snapshot.attendance.len(),
        "Snapshot loaded"
    );

    let store = Arc::new(InMemoryStore::new());
    let log = Arc::new(EventLogSnapshot::new(snapshot.events, snapshot.attendance));
    let job = AffinityRecomputeJob::new(&config, log, store.clone(), store.clone());

    let summary = job.run_batch(&snapshot.connections, now).await;

    let viewers: BTreeSet<Uuid> = snapshot.connections.iter().map(|c| c.viewer_id).collect();
    let mut suggestions = BTreeMap::new();
    for viewer_id in viewers {
        let live = store
            .pending_for_viewer(viewer_id, now)
            .await
            .with_context(|| format!("Failed to read suggestions for {}", viewer_id))?;
        suggestions.insert(viewer_id, live);
    }

    let output = BatchOutput {
        summary,
        suggestions,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize batch output")?
    );

    Ok(())
}
