//! Append-only observation log.
//!
//! The log lives in memory as an `Arc<Vec<Observation>>`. Readers take a
//! snapshot by cloning the `Arc`, which is atomic and never blocks the
//! writer for longer than a pointer copy; appends copy-on-write only when a
//! snapshot is still alive.
//!
//! The durable copy is written through a [`KeyValueStore`] on a best-effort
//! basis. If it fails, the in-memory log stays authoritative for the rest of
//! the session.
//!
//! Several handles may share one backend (a running agent and a CLI
//! `clear`, say). Every clear records a [`ClearMarker`] next to the log, and
//! every flush checks it first: observations taken before a clear made by
//! another handle are dropped instead of being written back.

use crate::core::observation::Observation;
use crate::core::persistence::{KeyValueStore, PersistenceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Key under which the observation log is persisted.
pub const DEFAULT_STORE_KEY: &str = "session_history";

/// Number of appends between automatic flushes to durable storage.
pub const DEFAULT_FLUSH_EVERY: usize = 30;

/// Immutable view of the log at one point in time.
pub type Snapshot = Arc<Vec<Observation>>;

/// Record of the latest clear, stored under `<key>_cleared`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearMarker {
    /// Bumped by every clear
    pub generation: u64,
    /// Observations at or before this instant were wiped
    pub cleared_at: Option<DateTime<Utc>>,
}

/// Ordered, append-only sequence of observations with durable backing.
pub struct ObservationStore {
    observations: Snapshot,
    backend: Arc<dyn KeyValueStore>,
    key: String,
    flush_every: usize,
    pending: usize,
    /// The clear this handle's memory reflects
    marker: ClearMarker,
    flush_seq: u64,
    /// Sequence number of the newest snapshot written; also orders writes
    /// against clears
    written: Arc<Mutex<u64>>,
}

impl ObservationStore {
    /// Load the log under `key`, or start empty.
    ///
    /// Missing, unreadable or corrupt stored data all yield an empty log.
    pub fn open(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let observations = match load_observations(backend.as_ref(), &key) {
            Ok(observations) => {
                debug!(key = %key, count = observations.len(), "loaded observation log");
                observations
            }
            Err(e) => {
                warn!(key = %key, error = %e, "discarding stored observation log");
                Vec::new()
            }
        };

        let marker = match load_marker(backend.as_ref(), &key) {
            Ok(marker) => marker.unwrap_or_default(),
            Err(e) => {
                warn!(key = %key, error = %e, "could not read clear marker");
                ClearMarker::default()
            }
        };

        Self {
            observations: Arc::new(observations),
            backend,
            key,
            flush_every: DEFAULT_FLUSH_EVERY,
            pending: 0,
            marker,
            flush_seq: 0,
            written: Arc::new(Mutex::new(0)),
        }
    }

    /// Set how many appends may accumulate before the log is flushed.
    /// A value of 1 writes through on every append.
    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    /// Append one observation, flushing inline when the threshold is hit.
    pub fn append(&mut self, observation: Observation) {
        if let Some(job) = self.push(observation) {
            match job.run() {
                Ok(Some(marker)) => self.apply_clear(marker),
                Ok(None) => {}
                Err(e) => warn!(key = %self.key, error = %e, "observation log flush failed"),
            }
        }
    }

    /// Append without writing; hands back the flush job when one is due.
    fn push(&mut self, observation: Observation) -> Option<FlushJob> {
        Arc::make_mut(&mut self.observations).push(observation);
        self.pending += 1;
        (self.pending >= self.flush_every).then(|| self.begin_flush())
    }

    /// Current contents. Later appends do not affect the returned snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.observations)
    }

    /// Number of observations in the log.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Drop every observation, in memory and on disk, and tell every other
    /// handle on the same backend to drop what it holds from before now.
    pub fn clear(&mut self) -> Result<(), PersistenceError> {
        let written = Arc::clone(&self.written);
        let _order = lock_written(&written);

        let stored = load_marker(self.backend.as_ref(), &self.key)
            .ok()
            .flatten()
            .unwrap_or_default();
        let marker = ClearMarker {
            generation: stored.generation.max(self.marker.generation) + 1,
            cleared_at: Some(Utc::now()),
        };

        self.observations = Arc::new(Vec::new());
        self.pending = 0;
        self.marker = marker;

        let json =
            serde_json::to_string(&marker).map_err(|e| PersistenceError::Write(e.to_string()))?;
        self.backend.save(&marker_key(&self.key), &json)?;
        self.backend.clear(&self.key)
    }

    /// Write the whole log to durable storage.
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        if let Some(marker) = self.begin_flush().run()? {
            self.apply_clear(marker);
        }
        Ok(())
    }

    fn begin_flush(&mut self) -> FlushJob {
        self.pending = 0;
        self.flush_seq += 1;
        FlushJob {
            backend: Arc::clone(&self.backend),
            key: self.key.clone(),
            snapshot: self.snapshot(),
            marker: self.marker,
            seq: self.flush_seq,
            written: Arc::clone(&self.written),
        }
    }

    /// Catch up with a clear made through another handle.
    fn apply_clear(&mut self, marker: ClearMarker) {
        if marker == self.marker {
            return;
        }

        let before = self.observations.len();
        if let Some(cleared_at) = marker.cleared_at {
            Arc::make_mut(&mut self.observations).retain(|o| o.timestamp > cleared_at);
        }
        self.marker = marker;
        info!(
            key = %self.key,
            dropped = before - self.observations.len(),
            "observation log was cleared elsewhere"
        );
    }
}

/// One pending write of a snapshot. Runs without access to the store, so it
/// can be moved off the async runtime.
struct FlushJob {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    snapshot: Snapshot,
    marker: ClearMarker,
    seq: u64,
    written: Arc<Mutex<u64>>,
}

impl FlushJob {
    /// Write the snapshot, minus anything a foreign clear wiped. Returns
    /// that clear's marker so the store can catch up.
    fn run(self) -> Result<Option<ClearMarker>, PersistenceError> {
        let mut written = lock_written(&self.written);
        if self.seq <= *written {
            // A newer snapshot is already on disk
            return Ok(None);
        }

        let foreign = load_marker(self.backend.as_ref(), &self.key)?
            .filter(|stored| *stored != self.marker);

        let json = match foreign.and_then(|m| m.cleared_at) {
            Some(cleared_at) => {
                let kept: Vec<&Observation> = self
                    .snapshot
                    .iter()
                    .filter(|o| o.timestamp > cleared_at)
                    .collect();
                serde_json::to_string(&kept)
            }
            None => serde_json::to_string(self.snapshot.as_slice()),
        }
        .map_err(|e| PersistenceError::Write(e.to_string()))?;

        self.backend.save(&self.key, &json)?;
        *written = self.seq;
        debug!(key = %self.key, count = self.snapshot.len(), "observation log flushed");
        Ok(foreign)
    }
}

fn marker_key(key: &str) -> String {
    format!("{key}_cleared")
}

fn lock_written(written: &Mutex<u64>) -> MutexGuard<'_, u64> {
    written.lock().unwrap_or_else(|e| e.into_inner())
}

fn load_observations(
    backend: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<Observation>, PersistenceError> {
    match backend.load(key)? {
        Some(json) => {
            serde_json::from_str(&json).map_err(|e| PersistenceError::ReadCorrupt(e.to_string()))
        }
        None => Ok(Vec::new()),
    }
}

/// A corrupt marker reads as absent so it can never block flushes.
fn load_marker(
    backend: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<ClearMarker>, PersistenceError> {
    let key = marker_key(key);
    match backend.load(&key)? {
        Some(json) => match serde_json::from_str(&json) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!(key = %key, error = %e, "ignoring corrupt clear marker");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Thread-safe handle to an [`ObservationStore`].
///
/// Each method holds the lock only for the duration of one in-memory
/// operation. Flushes write a snapshot with the lock released, on tokio's
/// blocking pool when a runtime is available.
#[derive(Clone)]
pub struct SharedObservationStore {
    inner: Arc<Mutex<ObservationStore>>,
}

impl SharedObservationStore {
    pub fn new(store: ObservationStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ObservationStore> {
        lock_store(&self.inner)
    }

    pub fn append(&self, observation: Observation) {
        let Some(job) = self.lock().push(observation) else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || finish_flush(&inner, job));
            }
            Err(_) => finish_flush(&inner, job),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.lock().clear()
    }

    /// Write the whole log from the blocking pool and wait for it.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let job = self.lock().begin_flush();
        let foreign = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| PersistenceError::Write(format!("flush task failed: {e}")))??;

        if let Some(marker) = foreign {
            self.lock().apply_clear(marker);
        }
        Ok(())
    }
}

// The store has no invariants a panicking writer could break halfway.
fn lock_store(inner: &Mutex<ObservationStore>) -> MutexGuard<'_, ObservationStore> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn finish_flush(inner: &Mutex<ObservationStore>, job: FlushJob) {
    let key = job.key.clone();
    match job.run() {
        Ok(Some(marker)) => lock_store(inner).apply_clear(marker),
        Ok(None) => {}
        Err(e) => warn!(key = %key, error = %e, "observation log flush failed"),
    }
}
