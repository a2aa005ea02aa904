//! # Serialized detection processing
//!
//! Frames usually arrive from asynchronous capture callbacks, while the aggregator must only be
//! driven from one place at a time. The worker owns an aggregator on a dedicated thread and feeds
//! it from a single-consumer queue.

use crate::aggregator::{MarkersUpdated, ObservationAggregator};
use crate::pose::PoseSample;
use crate::settings::MarkerSettings;
use anyhow::{anyhow, Result};
use log::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender, TryIter},
    Arc, LockResult, Mutex, MutexGuard,
};
use std::thread::{spawn, JoinHandle};

/// Aggregator running on its own thread.
///
/// Every submitted batch produces exactly one [`MarkersUpdated`] message, in submission order.
/// The update queue is unbounded, so a long running worker must be drained regularly, either by
/// blocking on [`updates`](Self::updates) or by polling [`pending_updates`](Self::pending_updates).
pub struct MarkerWorker {
    detections: Option<Sender<Vec<PoseSample>>>,
    updates: Receiver<MarkersUpdated>,
    settings: Arc<Mutex<MarkerSettings>>,
    signal: Arc<AtomicBool>,
    handle: Option<JoinHandle<ObservationAggregator>>,
}

impl MarkerWorker {
    pub fn new(settings: MarkerSettings) -> Self {
        let (detections, rx) = mpsc::channel::<Vec<PoseSample>>();
        let (tx, updates) = mpsc::channel();
        let settings = Arc::new(Mutex::new(settings));
        let signal = Arc::new(AtomicBool::new(true));

        let handle = Some({
            let settings = settings.clone();
            let signal = signal.clone();
            let mut aggregator = ObservationAggregator::new(Self::read_settings(&settings));

            spawn(move || {
                for batch in rx {
                    if !signal.load(Ordering::Relaxed) {
                        break;
                    }

                    // Settings are sampled once per batch, so that a cycle sees a consistent set.
                    aggregator.set_settings(Self::read_settings(&settings));

                    let updated = aggregator.process_detections(batch);

                    if tx.send(updated).is_err() {
                        debug!("Marker update receiver gone, stopping worker");
                        break;
                    }
                }

                aggregator
            })
        });

        Self {
            detections: Some(detections),
            updates,
            settings,
            signal,
            handle,
        }
    }

    fn read_settings(settings: &Mutex<MarkerSettings>) -> MarkerSettings {
        settings
            .lock()
            .map(|s| *s)
            .unwrap_or_else(|e| *e.into_inner())
    }

    /// Lock the live settings. Changes apply from the next processed batch.
    pub fn settings(&self) -> LockResult<MutexGuard<MarkerSettings>> {
        self.settings.lock()
    }

    /// Queue a single frame's detections.
    pub fn submit(&self, batch: Vec<PoseSample>) -> Result<()> {
        self.detections
            .as_ref()
            .ok_or_else(|| anyhow!("Worker is stopped"))?
            .send(batch)
            .map_err(|_| anyhow!("Worker thread has exited"))
    }

    /// Stream of finalized pose batches.
    pub fn updates(&self) -> &Receiver<MarkersUpdated> {
        &self.updates
    }

    /// Drain the updates produced so far, without blocking.
    pub fn pending_updates(&self) -> TryIter<MarkersUpdated> {
        self.updates.try_iter()
    }

    /// Process all queued batches, stop the thread and return the aggregator.
    pub fn finish(mut self) -> Result<ObservationAggregator> {
        self.detections.take();
        self.handle
            .take()
            .ok_or_else(|| anyhow!("Worker already stopped"))?
            .join()
            .map_err(|_| anyhow!("Worker thread panicked"))
    }
}

impl Drop for MarkerWorker {
    fn drop(&mut self) {
        self.signal.store(false, Ordering::Relaxed);
        self.detections.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
