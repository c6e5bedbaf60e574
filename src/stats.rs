//! Pipeline statistics.
//!
//! Counts what the sampling loop did: ticks attempted, frames captured,
//! classifier failures, observations recorded and interventions raised.
//! Counters are cumulative across runs when a persistence path is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// File name used for persisted stats under the data directory.
pub const STATS_FILE_NAME: &str = "pipeline_stats.json";

/// Counters for the sampling pipeline.
#[derive(Debug)]
pub struct PipelineStats {
    /// Ticks that started
    ticks_attempted: AtomicU64,
    /// Ticks skipped because no frame was available
    capture_unavailable: AtomicU64,
    /// Ticks whose classifier call failed or returned a malformed body
    classifier_failures: AtomicU64,
    /// Observations appended to the store
    observations_recorded: AtomicU64,
    /// Interventions raised by the gate
    interventions_triggered: AtomicU64,
    /// Identifies this run in logs and summaries
    session_id: Uuid,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    /// Create a new, zeroed set of counters.
    pub fn new() -> Self {
        Self {
            ticks_attempted: AtomicU64::new(0),
            capture_unavailable: AtomicU64::new(0),
            classifier_failures: AtomicU64::new(0),
            observations_recorded: AtomicU64::new(0),
            interventions_triggered: AtomicU64::new(0),
            session_id: Uuid::new_v4(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create counters that continue from the totals saved at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            debug!(error = %e, "could not load previous pipeline stats");
        }

        stats
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn record_tick(&self) {
        self.ticks_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_unavailable(&self) {
        self.capture_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_failure(&self) {
        self.classifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observation(&self) {
        self.observations_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intervention(&self) {
        self.interventions_triggered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks_attempted: self.ticks_attempted.load(Ordering::Relaxed),
            capture_unavailable: self.capture_unavailable.load(Ordering::Relaxed),
            classifier_failures: self.classifier_failures.load(Ordering::Relaxed),
            observations_recorded: self.observations_recorded.load(Ordering::Relaxed),
            interventions_triggered: self.interventions_triggered.load(Ordering::Relaxed),
            session_id: self.session_id,
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        // Persisted counters carry on from earlier runs
        let scope = if self.persist_path.is_some() {
            "totals across runs"
        } else {
            "this run"
        };
        format!(
            "Pipeline Statistics ({scope}; session {}):\n\
             - Ticks attempted: {}\n\
             - Capture unavailable: {}\n\
             - Classifier failures: {}\n\
             - Observations recorded: {}\n\
             - Interventions triggered: {}\n\
             - This session's duration: {} seconds",
            &stats.session_id.to_string()[..8],
            stats.ticks_attempted,
            stats.capture_unavailable,
            stats.classifier_failures,
            stats.observations_recorded,
            stats.interventions_triggered,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                ticks_attempted: stats.ticks_attempted,
                capture_unavailable: stats.capture_unavailable,
                classifier_failures: stats.classifier_failures,
                observations_recorded: stats.observations_recorded,
                interventions_triggered: stats.interventions_triggered,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.ticks_attempted
                    .store(persisted.ticks_attempted, Ordering::Relaxed);
                self.capture_unavailable
                    .store(persisted.capture_unavailable, Ordering::Relaxed);
                self.classifier_failures
                    .store(persisted.classifier_failures, Ordering::Relaxed);
                self.observations_recorded
                    .store(persisted.observations_recorded, Ordering::Relaxed);
                self.interventions_triggered
                    .store(persisted.interventions_triggered, Ordering::Relaxed);
            }
        }
        Ok(())
    }

}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ticks_attempted: u64,
    pub capture_unavailable: u64,
    pub classifier_failures: u64,
    pub observations_recorded: u64,
    pub interventions_triggered: u64,
    pub session_id: Uuid,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub ticks_attempted: u64,
    pub capture_unavailable: u64,
    pub classifier_failures: u64,
    pub observations_recorded: u64,
    pub interventions_triggered: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared pipeline stats.
pub type SharedPipelineStats = Arc<PipelineStats>;

/// Create new shared stats.
pub fn create_shared_stats() -> SharedPipelineStats {
    Arc::new(PipelineStats::new())
}

/// Create new shared stats with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedPipelineStats {
    Arc::new(PipelineStats::with_persistence(path))
}
