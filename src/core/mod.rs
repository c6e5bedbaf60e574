//! Core functionality for the Learning Coach Agent.
//!
//! This module contains:
//! - The observation model and its append-only store
//! - Key-value persistence for the store
//! - The intervention gate that throttles user-facing suggestions
//! - Pure aggregation of the observation log into dashboard figures

pub mod aggregate;
pub mod gate;
pub mod observation;
pub mod persistence;
pub mod store;

// Re-export commonly used types
pub use aggregate::{
    build_report, bucketize, compute_kpis, daily_summary, heatmap, weekday_breakdown,
    AnalyticsReport, Bucket, DaySummary, ExternalCounts, HeatmapCell, Kpis, ReportOptions,
    WeekdayActivity, MAX_HEATMAP_DAYS,
};
pub use gate::{
    ConfusedRouting, Dismissal, GateCues, GatePolicy, GateView, Intervention, InterventionGate,
    InterventionState, SharedGate,
};
pub use observation::{LearningState, Observation, MAX_FOCUS_SCORE};
pub use persistence::{JsonFileStore, KeyValueStore, MemoryStore, PersistenceError};
pub use store::{
    ClearMarker, ObservationStore, SharedObservationStore, Snapshot, DEFAULT_STORE_KEY,
};
