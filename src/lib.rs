//! Learning Coach Agent - webcam engagement monitoring and study analytics.
//!
//! This library samples a video source at a fixed interval, asks an
//! external emotion classifier about each frame, and turns the answers into
//! a persisted time-series of observations. A throttled gate decides when
//! to suggest a break or a rest, and pure aggregation functions roll the
//! log up into dashboard figures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Learning Coach Agent                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐        │
//! │  │   Capture   │──▶│ Classifier  │──▶│ ObservationStore │        │
//! │  │ (1s ticks)  │   │   (HTTP)    │   │  (append-only)   │        │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘        │
//! │                           │                    │                  │
//! │                           ▼                    ▼                  │
//! │                  ┌──────────────────┐  ┌─────────────┐           │
//! │                  │ InterventionGate │  │ Aggregator  │           │
//! │                  │ (2 min cooldown) │  │ (KPIs, map) │           │
//! │                  └──────────────────┘  └─────────────┘           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use learning_coach_agent::{
//!     capture::FileFrameSource,
//!     classifier::{ClassifierConfig, HttpClassifier},
//!     core::{InterventionGate, MemoryStore, ObservationStore, SharedGate, SharedObservationStore},
//!     sampling::{SamplingController, SamplingLoop},
//!     stats::create_shared_stats,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let classifier = HttpClassifier::new(ClassifierConfig::new("http://localhost:5000/analyze"))?;
//! let store = SharedObservationStore::new(ObservationStore::open(
//!     Arc::new(MemoryStore::new()),
//!     "session_history",
//! ));
//! let gate = SharedGate::new(InterventionGate::default());
//!
//! let sampling_loop = SamplingLoop::new(
//!     Box::new(FileFrameSource::new("/tmp/webcam.jpg")),
//!     Arc::new(classifier),
//!     store.clone(),
//!     gate.clone(),
//!     create_shared_stats(),
//!     std::time::Duration::from_secs(1),
//! );
//!
//! let mut controller = SamplingController::new(sampling_loop);
//! controller.start()?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod classifier;
pub mod config;
pub mod core;
pub mod sampling;
pub mod stats;

// Re-export key types at crate root for convenience
pub use crate::capture::{CaptureError, FileFrameSource, Frame, FrameSource, NoopFrameSource};
pub use crate::classifier::{
    ClassificationResult, Classifier, ClassifierConfig, ClassifierError, HttpClassifier,
};
pub use crate::config::{Config, ConfigError};
pub use crate::core::{
    build_report, AnalyticsReport, Dismissal, InterventionGate, InterventionState, Observation,
    ObservationStore, SharedGate, SharedObservationStore,
};
pub use crate::sampling::{SamplingController, SamplingError, SamplingLoop, TickOutcome};
pub use crate::stats::{PipelineStats, SharedPipelineStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          LEARNING COACH AGENT - PRIVACY DECLARATION              ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent watches your webcam while you study to estimate      ║
║  how focused you are.                                            ║
║                                                                  ║
║  ✓ WHAT WE KEEP:                                                 ║
║    • An emotion label per second (e.g. "Happy", "Neutral")       ║
║    • A focus score between 0 and 6                               ║
║    • A learning state (e.g. "Focused", "Tired", "Confused")      ║
║    • The time each reading was taken                             ║
║                                                                  ║
║  ✗ WHAT WE NEVER KEEP:                                           ║
║    • Webcam images (each frame is dropped after classification)  ║
║    • Audio of any kind                                           ║
║    • What you are studying or which sites you visit              ║
║                                                                  ║
║  Frames are sent only to the classifier endpoint you configure.  ║
║  Readings stay on this machine.                                  ║
║                                                                  ║
║  You can wipe all readings anytime with:                         ║
║    coach-agent clear                                             ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER KEEP"));
        assert!(PRIVACY_DECLARATION.contains("Webcam images"));
    }
}
