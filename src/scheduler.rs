//! Debounced, field-level persistence of record edits.
//!
//! Edits land in a [`PendingChanges`] set; a periodic [`SaveScheduler::tick`]
//! sends the whole set to the store in one call. Only one save is in flight
//! at a time and edits made meanwhile wait for the next tick.

use crate::config::SaveFailure;
use crate::db::{RecordStore, StoreError};
use crate::model::{Change, Field, PendingChanges};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

/// Default flush period.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing pending; the store was not called.
    Idle,
    /// A previous save is still outstanding.
    Busy,
    Saved { fields: usize },
    Failed { fields: usize, retained: bool },
}

#[derive(Debug, Default)]
struct Buffers {
    pending: PendingChanges,
    in_flight: PendingChanges,
}

pub struct SaveScheduler {
    record_id: String,
    store: Arc<dyn RecordStore>,
    on_failure: SaveFailure,
    buffers: Mutex<Buffers>,
    flushing: tokio::sync::Mutex<()>,
}

impl SaveScheduler {
    pub fn new(record_id: impl Into<String>, store: Arc<dyn RecordStore>, on_failure: SaveFailure) -> Self {
        Self {
            record_id: record_id.into(),
            store,
            on_failure,
            buffers: Mutex::new(Buffers::default()),
            flushing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Queue `change`, replacing any pending value for the same field.
    pub fn schedule(&self, change: Change) {
        debug!(record_id = %self.record_id, field = %change.field(), "scheduled change");
        self.lock().pending.insert(change);
    }

    /// True while `field` has a value that is queued or being saved.
    pub fn is_unsaved(&self, field: Field) -> bool {
        let buffers = self.lock();
        buffers.pending.contains(field) || buffers.in_flight.contains(field)
    }

    pub fn has_unsaved(&self) -> bool {
        let buffers = self.lock();
        !buffers.pending.is_empty() || !buffers.in_flight.is_empty()
    }

    /// Snapshot of the queued (not yet in flight) changes.
    pub fn pending(&self) -> PendingChanges {
        self.lock().pending.clone()
    }

    /// One scheduler period: save everything pending unless a save is
    /// already running.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.flushing.try_lock() else {
            debug!(record_id = %self.record_id, "previous save still outstanding");
            return TickOutcome::Busy;
        };
        match self.save_pending().await {
            Ok(0) => TickOutcome::Idle,
            Ok(fields) => TickOutcome::Saved { fields },
            Err((fields, _)) => TickOutcome::Failed {
                fields,
                retained: self.on_failure == SaveFailure::Retain,
            },
        }
    }

    /// Wait for any outstanding save, then save what is pending.
    /// Returns the number of fields written.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        let _guard = self.flushing.lock().await;
        self.save_pending().await.map_err(|(_, err)| err)
    }

    /// Tick every `period` until the task is aborted.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    pub fn spawn(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(period))
    }

    /// Callers hold `flushing`.
    #[instrument(skip_all, fields(record_id = %self.record_id))]
    async fn save_pending(&self) -> Result<usize, (usize, StoreError)> {
        let batch = {
            let mut buffers = self.lock();
            if buffers.pending.is_empty() {
                return Ok(0);
            }
            let batch = std::mem::take(&mut buffers.pending);
            buffers.in_flight = batch.clone();
            batch
        };
        let fields = batch.len();

        let result = self.store.save(&self.record_id, &batch).await;

        let mut buffers = self.lock();
        buffers.in_flight = PendingChanges::new();
        match result {
            Ok(()) => {
                info!(fields, "flushed pending changes");
                Ok(fields)
            }
            Err(err) => {
                match self.on_failure {
                    SaveFailure::Retain => {
                        warn!(?err, fields, "save failed; changes kept for next tick");
                        buffers.pending.merge_older(batch);
                    }
                    SaveFailure::Discard => {
                        warn!(?err, fields, "save failed; changes dropped");
                    }
                }
                Err((fields, err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
