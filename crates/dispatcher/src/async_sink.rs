//! AsyncSink - per-device queue in front of a blocking sink delegate
//!
//! Request paths call [`AsyncSink::handle`] and return immediately; a
//! dedicated worker owns the delegate for the lifetime of one session and
//! hands it back on [`AsyncSink::stop`].

use std::sync::Arc;

use contracts::{DataSink, MeasurementId, SampleBatch};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

enum SinkState<S> {
    /// Delegate parked between sessions
    Idle(S),
    Running {
        measurement: MeasurementId,
        tx: mpsc::UnboundedSender<SampleBatch>,
        worker: JoinHandle<S>,
    },
    /// Delegate is being opened or drained, or was lost to a worker panic
    Detached,
}

/// Queue-backed write path for one device
pub struct AsyncSink<S> {
    name: String,
    state: Mutex<SinkState<S>>,
    metrics: Arc<SinkMetrics>,
}

impl<S: DataSink + Send + 'static> AsyncSink<S> {
    pub fn new(sink: S) -> Self {
        Self {
            name: sink.name().to_string(),
            state: Mutex::new(SinkState::Idle(sink)),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Measurement of the running session, if any
    pub fn measurement(&self) -> Option<MeasurementId> {
        match &*self.state.lock() {
            SinkState::Running { measurement, .. } => Some(measurement.clone()),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.state.lock(), SinkState::Running { .. })
    }

    /// Open the delegate for `measurement` and start draining
    ///
    /// Starting the session that is already running is a no-op. A session for
    /// another measurement is stopped first.
    #[instrument(name = "async_sink_start", skip(self, measurement), fields(sink = %self.name, measurement = %measurement))]
    pub async fn start(&self, measurement: &MeasurementId) -> Result<(), DispatcherError> {
        let running = self.measurement();
        if running.as_ref() == Some(measurement) {
            debug!("Session already running");
            return Ok(());
        }
        if let Some(previous) = running {
            warn!(previous = %previous, "Superseding running session");
            let reason = format!("superseded by {measurement}");
            self.stop(&previous, Some(&reason)).await?;
        }

        let taken = std::mem::replace(&mut *self.state.lock(), SinkState::Detached);
        let mut sink = match taken {
            SinkState::Idle(sink) => sink,
            other => {
                // Raced with another start; leave the winner in place.
                *self.state.lock() = other;
                return Err(DispatcherError::WorkerFailed {
                    sink_name: self.name.clone(),
                    message: "delegate not available".to_string(),
                });
            }
        };

        if let Err(e) = sink.open(measurement).await {
            error!(error = %e, "Failed to open sink");
            *self.state.lock() = SinkState::Idle(sink);
            return Err(e.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(sink_worker(
            sink,
            rx,
            Arc::clone(&self.metrics),
            self.name.clone(),
        ));
        *self.state.lock() = SinkState::Running {
            measurement: measurement.clone(),
            tx,
            worker,
        };
        info!("Async sink started");
        Ok(())
    }

    /// Enqueue a batch without waiting for it to be written
    ///
    /// Returns false (and drops the batch) when no session is running.
    pub fn handle(&self, batch: SampleBatch) -> bool {
        self.enqueue(None, batch)
    }

    /// Like [`handle`](Self::handle), but only into the session for `measurement`
    pub fn handle_for(&self, measurement: &MeasurementId, batch: SampleBatch) -> bool {
        self.enqueue(Some(measurement), batch)
    }

    fn enqueue(&self, expected: Option<&MeasurementId>, batch: SampleBatch) -> bool {
        let state = self.state.lock();
        let SinkState::Running { measurement, tx, .. } = &*state else {
            self.metrics.inc_dropped_count();
            warn!(sink = %self.name, samples = batch.len(), "No running session, batch dropped");
            return false;
        };
        if let Some(expected) = expected.filter(|e| *e != measurement) {
            self.metrics.inc_dropped_count();
            warn!(
                sink = %self.name,
                running = %measurement,
                measurement = %expected,
                samples = batch.len(),
                "Batch for another measurement, dropped"
            );
            return false;
        }
        match tx.send(batch) {
            Ok(()) => {
                self.metrics.set_queue_len(self.metrics.queue_len() + 1);
                true
            }
            Err(_) => {
                self.metrics.inc_dropped_count();
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Drain everything queued so far, then close the delegate
    ///
    /// Every batch accepted by `handle` before this call is written before it
    /// returns. A session for another measurement is left running.
    #[instrument(name = "async_sink_stop", skip(self, measurement), fields(sink = %self.name, measurement = %measurement))]
    pub async fn stop(
        &self,
        measurement: &MeasurementId,
        failure_reason: Option<&str>,
    ) -> Result<(), DispatcherError> {
        let (tx, worker) = {
            let mut state = self.state.lock();
            if let SinkState::Running { measurement: running, .. } = &*state {
                if running != measurement {
                    return Err(DispatcherError::SessionMismatch {
                        sink_name: self.name.clone(),
                        running: running.clone(),
                        requested: measurement.clone(),
                    });
                }
            }
            match std::mem::replace(&mut *state, SinkState::Detached) {
                SinkState::Running { tx, worker, .. } => (tx, worker),
                other => {
                    *state = other;
                    return Err(DispatcherError::not_started(&self.name));
                }
            }
        };

        drop(tx);
        let mut sink = worker.await.map_err(|e| {
            error!(error = ?e, "Sink worker panicked, delegate lost");
            DispatcherError::WorkerFailed {
                sink_name: self.name.clone(),
                message: e.to_string(),
            }
        })?;

        let flushed = sink.flush().await;
        let closed = sink.close(failure_reason).await;
        *self.state.lock() = SinkState::Idle(sink);

        flushed?;
        closed?;
        let totals = self.metrics.snapshot();
        info!(
            failure_reason = ?failure_reason,
            batches = totals.write_count,
            samples = totals.sample_count,
            failed = totals.failure_count,
            dropped = totals.dropped_count,
            "Async sink stopped"
        );
        Ok(())
    }
}

/// Worker task that drains the queue into the delegate and returns it
#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<SampleBatch>,
    metrics: Arc<SinkMetrics>,
    name: String,
) -> S {
    debug!("Sink worker started");

    while let Some(batch) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&batch).await {
            Ok(()) => {
                metrics.inc_write_count(batch.len());
                observability::record_sink_batch(&name, batch.len(), true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_sink_batch(&name, batch.len(), false);
                error!(samples = batch.len(), error = %e, "Write failed");
            }
        }
    }

    debug!("Sink worker drained");
    sink
}
