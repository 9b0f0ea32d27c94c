//! Bounded background queue in front of the pipeline.
//!
//! Submitting never blocks: when the buffer is full the caller gets
//! [`QueueError::Full`] and can shed load. A single dispatcher pulls
//! requests off the channel and runs each on its own task, bounded by a
//! semaphore.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::QueueConfig;
use crate::types::ProcessingRequest;

use super::processor::{ImagePipeline, PipelineOutcome};

/// Why a request could not be queued.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Processing queue is full")]
    Full,

    #[error("Processing queue is shut down")]
    Closed,
}

/// Counters reported when the queue shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: &PipelineOutcome) {
        let counter = match outcome {
            PipelineOutcome::Completed(_) => &self.completed,
            PipelineOutcome::Failed { .. } | PipelineOutcome::Aborted(_) => &self.failed,
            PipelineOutcome::AlreadyCompleted | PipelineOutcome::InProgress => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Cheap, cloneable handle for submitting work.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<ProcessingRequest>,
}

impl QueueHandle {
    /// Enqueue a request without waiting.
    pub fn submit(&self, request: ProcessingRequest) -> Result<(), QueueError> {
        let image_id = request.image_id;
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(image_id, "Processing queue full, rejecting request");
                QueueError::Full
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        tracing::debug!(image_id, "Request queued");
        Ok(())
    }
}

/// The running queue: a dispatcher task plus its worker tasks.
pub struct ProcessingQueue {
    handle: QueueHandle,
    shutdown: oneshot::Sender<()>,
    dispatcher: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl ProcessingQueue {
    /// Spawn the dispatcher. Must be called within a tokio runtime.
    pub fn start(pipeline: Arc<ImagePipeline>, config: &QueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());

        let dispatcher = tokio::spawn(dispatch(
            pipeline,
            rx,
            shutdown_rx,
            Arc::new(Semaphore::new(config.workers.max(1))),
            counters.clone(),
        ));

        tracing::debug!(
            buffer_size = config.buffer_size,
            workers = config.workers,
            "Processing queue started"
        );

        Self {
            handle: QueueHandle { tx },
            shutdown: shutdown_tx,
            dispatcher,
            counters,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Stop accepting work, finish everything already queued or running,
    /// and return the totals.
    pub async fn shutdown(self) -> QueueStats {
        let Self {
            handle,
            shutdown,
            dispatcher,
            counters,
        } = self;
        drop(handle);
        let _ = shutdown.send(());

        if let Err(e) = dispatcher.await {
            tracing::error!("Queue dispatcher panicked: {e}");
        }

        let stats = counters.snapshot();
        tracing::info!(
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            "Processing queue drained"
        );
        stats
    }
}

async fn dispatch(
    pipeline: Arc<ImagePipeline>,
    mut rx: mpsc::Receiver<ProcessingRequest>,
    mut shutdown: oneshot::Receiver<()>,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    let mut workers = JoinSet::new();

    loop {
        let request = tokio::select! {
            request = rx.recv() => request,
            _ = &mut shutdown => {
                // Outstanding handles may still hold senders; stop new
                // submissions and drain what is already buffered.
                rx.close();
                while let Some(request) = rx.recv().await {
                    spawn_worker(&mut workers, &pipeline, &semaphore, &counters, request).await;
                }
                break;
            }
        };

        match request {
            Some(request) => {
                spawn_worker(&mut workers, &pipeline, &semaphore, &counters, request).await
            }
            None => break,
        }

        // Reap finished workers so the set does not grow unbounded.
        while let Some(joined) = workers.try_join_next() {
            if let Err(e) = joined {
                tracing::error!("Processing task panicked: {e}");
            }
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Processing task panicked: {e}");
        }
    }
}

async fn spawn_worker(
    workers: &mut JoinSet<()>,
    pipeline: &Arc<ImagePipeline>,
    semaphore: &Arc<Semaphore>,
    counters: &Arc<Counters>,
    request: ProcessingRequest,
) {
    let Ok(permit) = semaphore.clone().acquire_owned().await else {
        tracing::warn!("Worker semaphore closed, dropping request {}", request.image_id);
        return;
    };

    let pipeline = pipeline.clone();
    let counters = counters.clone();
    workers.spawn(async move {
        let outcome = pipeline.process(&request).await;
        drop(permit);
        counters.record(&outcome);
    });
}
