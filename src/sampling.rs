//! Fixed-interval sampling loop.
//!
//! Each tick grabs a frame, sends it to the classifier and, on a
//! well-formed answer, appends one observation and lets the intervention
//! gate look at it. A tick runs to completion before the next one starts,
//! so there is never more than one classifier call in flight per loop. A
//! slow call stretches the effective period; ticks it overran are skipped,
//! not replayed.
//!
//! [`SamplingController`] owns the loop and maps "capture on/off" onto
//! spawning and cancelling it. Stopping cancels future ticks only: a tick
//! already in flight finishes and its observation is kept.

use crate::capture::{CaptureError, FrameSource};
use crate::classifier::Classifier;
use crate::core::gate::{Intervention, SharedGate};
use crate::core::observation::Observation;
use crate::core::store::SharedObservationStore;
use crate::stats::SharedPipelineStats;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No frame was available; nothing was sent
    CaptureUnavailable,
    /// The classifier call failed or returned a malformed body
    ClassifierFailed,
    /// One observation was recorded, possibly raising an intervention
    Recorded {
        observation: Observation,
        intervention: Option<Intervention>,
    },
}

/// The sampling pipeline: frame source, classifier, store and gate.
pub struct SamplingLoop {
    source: Box<dyn FrameSource>,
    classifier: Arc<dyn Classifier>,
    store: SharedObservationStore,
    gate: SharedGate,
    stats: SharedPipelineStats,
    interval: Duration,
}

impl SamplingLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        classifier: Arc<dyn Classifier>,
        store: SharedObservationStore,
        gate: SharedGate,
        stats: SharedPipelineStats,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            classifier,
            store,
            gate,
            stats,
            interval,
        }
    }

    /// Run one tick to completion.
    pub async fn tick(&mut self) -> TickOutcome {
        self.stats.record_tick();

        let frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(CaptureError::Unavailable(reason)) => {
                debug!(%reason, "no frame this tick");
                self.stats.record_capture_unavailable();
                return TickOutcome::CaptureUnavailable;
            }
            Err(e) => {
                warn!(error = %e, source = %self.source.describe(), "frame capture failed");
                self.stats.record_capture_unavailable();
                return TickOutcome::CaptureUnavailable;
            }
        };

        if frame.is_empty() {
            debug!(source = %self.source.describe(), "empty frame, skipping tick");
            self.stats.record_capture_unavailable();
            return TickOutcome::CaptureUnavailable;
        }
        debug!(bytes = frame.len(), mime = %frame.mime_type, "frame captured");

        let result = match self.classifier.classify(&frame).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "classification failed, dropping sample");
                self.stats.record_classifier_failure();
                return TickOutcome::ClassifierFailed;
            }
        };

        let observation = result.to_observation(frame.captured_at);
        self.store.append(observation.clone());
        self.stats.record_observation();

        let intervention = self.gate.observe(&result.cues(), Utc::now());
        if intervention.is_some() {
            self.stats.record_intervention();
        }

        debug!(
            emotion = %observation.emotion,
            score = observation.focus_score,
            state = %observation.learning_state,
            "observation recorded"
        );

        TickOutcome::Recorded {
            observation,
            intervention,
        }
    }

    /// Tick every `interval` until `cancel` fires, then hand the loop back.
    ///
    /// The first tick happens one full interval after the call.
    pub async fn run(mut self, cancel: CancellationToken) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            source = %self.source.describe(),
            session = %self.stats.session_id(),
            "sampling loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Not raced against cancellation: an in-flight tick always completes.
            self.tick().await;
        }

        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "could not flush observation log on stop");
        }
        info!("sampling loop stopped");
        self
    }
}

/// Errors from starting and stopping the loop.
#[derive(Debug)]
pub enum SamplingError {
    AlreadyRunning,
    /// The loop task panicked; its frame source and classifier are gone
    TaskFailed(String),
}

impl std::fmt::Display for SamplingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingError::AlreadyRunning => write!(f, "Sampling is already running"),
            SamplingError::TaskFailed(e) => write!(f, "Sampling task failed: {e}"),
        }
    }
}

impl std::error::Error for SamplingError {}

/// Start/stop handle for a [`SamplingLoop`].
pub struct SamplingController {
    parked: Option<SamplingLoop>,
    handle: Option<JoinHandle<SamplingLoop>>,
    cancel_token: Option<CancellationToken>,
}

impl SamplingController {
    pub fn new(sampling_loop: SamplingLoop) -> Self {
        Self {
            parked: Some(sampling_loop),
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Turn capture on. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), SamplingError> {
        if self.handle.is_some() {
            return Err(SamplingError::AlreadyRunning);
        }
        let sampling_loop = self.parked.take().ok_or_else(|| {
            SamplingError::TaskFailed("sampling loop was lost in an earlier failure".to_string())
        })?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop.run(cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Turn capture off and wait for any in-flight tick to finish.
    /// Stopping an idle controller is a no-op.
    pub async fn stop(&mut self) -> Result<(), SamplingError> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            let sampling_loop = handle
                .await
                .map_err(|e| SamplingError::TaskFailed(e.to_string()))?;
            self.parked = Some(sampling_loop);
        }
        Ok(())
    }
}

impl Drop for SamplingController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
