//! Dispatcher - command queue drained by a fixed pool of workers

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use contracts::{Command, CommandHandler};

use crate::error::DispatcherError;
use crate::metrics::CommandMetrics;

/// Builder for a [`Dispatcher`]
pub struct DispatcherBuilder {
    workers: usize,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker count; commands run strictly in order only with one worker
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Spawn the worker pool on the current runtime
    #[instrument(name = "dispatcher_spawn", skip(self, handler), fields(workers = self.workers))]
    pub fn spawn<H>(self, handler: Arc<H>) -> Dispatcher
    where
        H: CommandHandler + Sync + 'static,
    {
        let (tx, rx) = async_channel::unbounded();
        let metrics = Arc::new(CommandMetrics::default());

        let workers = (0..self.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    rx.clone(),
                    Arc::clone(&handler),
                    Arc::clone(&metrics),
                ))
            })
            .collect();

        info!(workers = self.workers, "Dispatcher started");
        Dispatcher {
            handle: DispatcherHandle { tx, metrics },
            workers,
        }
    }
}

/// Cloneable producer side of the dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: Sender<Command>,
    metrics: Arc<CommandMetrics>,
}

impl DispatcherHandle {
    /// Enqueue a command without waiting for it to run
    ///
    /// Returns false if the dispatcher has shut down; the command is dropped.
    pub fn offer(&self, command: Command) -> bool {
        self.try_offer(command).is_ok()
    }

    pub fn try_offer(&self, command: Command) -> Result<(), DispatcherError> {
        match self.tx.try_send(command) {
            Ok(()) => {
                self.metrics.inc_offered();
                Ok(())
            }
            Err(e) => {
                let kind = e.into_inner().kind();
                self.metrics.inc_rejected();
                error!(command = kind, "Dispatcher closed, command dropped");
                Err(DispatcherError::QueueClosed { kind })
            }
        }
    }

    /// Commands waiting for a worker
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn metrics(&self) -> &Arc<CommandMetrics> {
        &self.metrics
    }
}

/// Running worker pool
pub struct Dispatcher {
    handle: DispatcherHandle,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    pub fn metrics(&self) -> &Arc<CommandMetrics> {
        &self.handle.metrics
    }

    /// Close the queue, let workers finish what was already offered, join them
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) {
        self.handle.tx.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = ?e, "Dispatcher worker panicked");
            }
        }
        info!(
            processed = self.handle.metrics.processed(),
            failed = self.handle.metrics.failed(),
            "Dispatcher shutdown complete"
        );
    }
}

/// One worker: pull, run, repeat until the queue is closed and empty
async fn worker_loop<H>(
    id: usize,
    rx: Receiver<Command>,
    handler: Arc<H>,
    metrics: Arc<CommandMetrics>,
) where
    H: CommandHandler + Sync + 'static,
{
    debug!(worker = id, "Dispatcher worker started");

    while let Ok(command) = rx.recv().await {
        let kind = command.kind();
        let handler = Arc::clone(&handler);

        // Run on its own task so a panicking handler surfaces as a JoinError
        // instead of taking the worker down.
        let outcome = tokio::spawn(async move { handler.handle(command).await }).await;

        metrics.inc_processed();
        match outcome {
            Ok(Ok(())) => {
                observability::record_command_processed(kind, true);
            }
            Ok(Err(e)) => {
                metrics.inc_failed();
                observability::record_command_processed(kind, false);
                error!(worker = id, command = kind, error = %e, "Command failed");
            }
            Err(e) => {
                metrics.inc_failed();
                observability::record_command_processed(kind, false);
                error!(worker = id, command = kind, error = ?e, "Command handler panicked");
            }
        }
    }

    debug!(worker = id, "Dispatcher worker stopped");
}
