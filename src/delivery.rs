//! Asynchronous hand-off of finished trails to a sink.
//!
//! A [`DeliveryPipeline`] owns one bounded FIFO queue and a fixed pool of
//! workers. Callers enqueue an owned snapshot of a trail and return
//! immediately (or, in blocking mode, as soon as there is room). Workers
//! dequeue and write to the sink exactly once per trail; failures go to the
//! optional error handler and are never surfaced to the caller.
//!
//! With more than one worker, trails may reach the sink out of enqueue order.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use trail_core::{Backpressure, DeliveryPipeline, MemorySink, Trail};
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # runtime.block_on(async {
//! let sink = Arc::new(MemorySink::new());
//! let pipeline = DeliveryPipeline::builder(sink.clone())
//!     .with_capacity(16)
//!     .with_backpressure(Backpressure::Drop)
//!     .spawn()
//!     .unwrap();
//!
//! let trail = Trail::new("trace-1", "req-1");
//! trail.finalize();
//! pipeline.write(Some(&trail), &CancellationToken::new()).await.unwrap();
//!
//! pipeline.close().await.unwrap();
//! assert_eq!(sink.len(), 1);
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DeliveryConfig, DEFAULT_QUEUE_CAPACITY};
use crate::error::{DeliveryError, SinkError};
use crate::sink::Sink;
use crate::trail::{Trail, TrailRecord};

/// What a write does when the queue is full. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Wait for space, or for the caller's cancellation signal.
    #[default]
    Block,
    /// Discard the trail silently.
    Drop,
}

impl fmt::Display for Backpressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backpressure::Block => write!(f, "block"),
            Backpressure::Drop => write!(f, "drop"),
        }
    }
}

/// Callback invoked by a worker when the sink rejects a trail.
pub type ErrorHandler = Arc<dyn Fn(&SinkError, &TrailRecord) + Send + Sync>;

/// Counters since the pipeline started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryStats {
    /// Trails accepted into the queue.
    pub enqueued: u64,
    /// Trails discarded because the queue was full.
    pub dropped: u64,
    /// Trails the sink accepted.
    pub delivered: u64,
    /// Trails the sink rejected.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Configures and starts a [`DeliveryPipeline`].
pub struct PipelineBuilder {
    sink: Arc<dyn Sink>,
    capacity: usize,
    workers: usize,
    backpressure: Backpressure,
    on_error: Option<ErrorHandler>,
}

impl PipelineBuilder {
    /// Starts a builder with default settings.
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            capacity: DEFAULT_QUEUE_CAPACITY,
            workers: 1,
            backpressure: Backpressure::Block,
            on_error: None,
        }
    }

    /// Applies capacity, worker count and policy from `config`.
    pub fn with_config(mut self, config: &DeliveryConfig) -> Self {
        self.capacity = config.effective_capacity();
        self.workers = config.effective_workers();
        self.backpressure = config.backpressure;
        self
    }

    /// Sets the queue capacity. Zero selects the default of 1000.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        self
    }

    /// Sets the worker count. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the full-queue policy.
    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Sets the callback for sink write failures.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SinkError, &TrailRecord) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Spawns the workers on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NoRuntime`] when called outside a runtime.
    pub fn spawn(self) -> Result<DeliveryPipeline, DeliveryError> {
        let runtime = Handle::try_current().map_err(|_| DeliveryError::NoRuntime)?;

        let (tx, rx) = mpsc::channel(self.capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let handles = (0..self.workers)
            .map(|_| {
                runtime.spawn(run_worker(
                    Arc::clone(&rx),
                    Arc::clone(&self.sink),
                    Arc::clone(&counters),
                    self.on_error.clone(),
                ))
            })
            .collect();

        let name = format!("async:{}", self.sink.name());
        tracing::debug!(
            sink = %name,
            capacity = self.capacity,
            workers = self.workers,
            backpressure = %self.backpressure,
            "delivery pipeline started"
        );

        Ok(DeliveryPipeline {
            name,
            sink: self.sink,
            sender: Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(Some(handles)),
            closed: AtomicBool::new(false),
            capacity: self.capacity,
            worker_count: self.workers,
            backpressure: self.backpressure,
            counters,
        })
    }
}

async fn run_worker(
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<TrailRecord>>>,
    sink: Arc<dyn Sink>,
    counters: Arc<Counters>,
    on_error: Option<ErrorHandler>,
) {
    loop {
        // Only the receive is under the lock; writes to the sink run concurrently.
        let next = queue.lock().await.recv().await;
        let Some(record) = next else {
            break;
        };

        match sink.write(&record).await {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sink = %sink.name(),
                    trace_id = %record.trace_id,
                    request_id = %record.request_id,
                    error = %err,
                    "trail delivery failed"
                );
                if let Some(handler) = &on_error {
                    handler(&err, &record);
                }
            }
        }
    }
}

/// Bounded queue plus worker pool in front of a [`Sink`].
///
/// Dropping the pipeline without calling [`close`](Self::close) lets the
/// workers drain what is already queued, but the sink is never closed.
pub struct DeliveryPipeline {
    name: String,
    sink: Arc<dyn Sink>,
    sender: Mutex<Option<mpsc::Sender<TrailRecord>>>,
    workers: tokio::sync::Mutex<Option<Vec<JoinHandle<()>>>>,
    closed: AtomicBool,
    capacity: usize,
    worker_count: usize,
    backpressure: Backpressure,
    counters: Arc<Counters>,
}

impl DeliveryPipeline {
    /// Starts a builder for `sink`.
    pub fn builder(sink: Arc<dyn Sink>) -> PipelineBuilder {
        PipelineBuilder::new(sink)
    }

    /// Spawns a pipeline configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NoRuntime`] when called outside a runtime.
    pub fn from_config(sink: Arc<dyn Sink>, config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        PipelineBuilder::new(sink).with_config(config).spawn()
    }

    fn sender(&self) -> Option<mpsc::Sender<TrailRecord>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Enqueues a snapshot of `trail`.
    ///
    /// No trail, or a closed pipeline, is a silent no-op. The snapshot is
    /// taken before enqueueing, so later changes to `trail` are not delivered.
    ///
    /// In [`Backpressure::Drop`] mode this never waits. In
    /// [`Backpressure::Block`] mode it waits for queue space unless `cancel`
    /// fires first. An already-cancelled token always aborts.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Cancelled`] if `cancel` fired in blocking mode.
    /// The trail is not delivered in that case.
    pub async fn write(
        &self,
        trail: Option<&Trail>,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let Some(trail) = trail else {
            return Ok(());
        };
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(sender) = self.sender() else {
            return Ok(());
        };

        let record = trail.record();
        match self.backpressure {
            Backpressure::Drop => match sender.try_send(record) {
                Ok(()) => {
                    self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(record)) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        sink = %self.name,
                        trace_id = %record.trace_id,
                        request_id = %record.request_id,
                        "delivery queue full, trail dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            },
            Backpressure::Block => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                    sent = sender.send(record) => {
                        if sent.is_ok() {
                            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Stops accepting trails, drains the queue, then closes the sink.
    ///
    /// The sink is closed strictly after every worker has finished, so no
    /// write can reach a closed sink. Calling `close` again returns `Ok(())`
    /// once the first call has completed.
    ///
    /// # Errors
    ///
    /// Returns the sink's close error.
    pub async fn close(&self) -> Result<(), SinkError> {
        let mut workers = self.workers.lock().await;
        let Some(handles) = workers.take() else {
            return Ok(());
        };

        self.closed.store(true, Ordering::Release);
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(sink = %self.name, error = %err, "delivery worker panicked");
            }
        }

        let stats = self.stats();
        tracing::info!(
            sink = %self.name,
            enqueued = stats.enqueued,
            dropped = stats.dropped,
            delivered = stats.delivered,
            failed = stats.failed,
            "delivery pipeline closed"
        );

        self.sink.close().await
    }

    /// Returns `"async:"` followed by the sink's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once [`close`](Self::close) has started.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of trails waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.sender()
            .map_or(0, |sender| sender.max_capacity() - sender.capacity())
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Worker count.
    pub fn workers(&self) -> usize {
        self.worker_count
    }

    /// Full-queue policy.
    pub fn backpressure(&self) -> Backpressure {
        self.backpressure
    }

    /// Current counters.
    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }
}

impl fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("workers", &self.worker_count)
            .field("backpressure", &self.backpressure)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkErrorKind;
    use crate::sink::{MemorySink, NoopSink};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct RejectingSink;

    #[async_trait]
    impl Sink for RejectingSink {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn write(&self, _record: &TrailRecord) -> Result<(), SinkError> {
            Err(SinkError::with_message(SinkErrorKind::Rejected, "no"))
        }
    }

    fn finished(id: usize) -> Trail {
        let trail = Trail::new(format!("trace-{id}"), format!("req-{id}"));
        trail.finalize();
        trail
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let result = DeliveryPipeline::builder(Arc::new(NoopSink)).spawn();
        assert_eq!(result.err(), Some(DeliveryError::NoRuntime));
    }

    #[tokio::test]
    async fn zero_values_are_normalized() {
        let pipeline = DeliveryPipeline::builder(Arc::new(NoopSink))
            .with_capacity(0)
            .with_workers(0)
            .spawn()
            .unwrap();

        assert_eq!(pipeline.capacity(), 1000);
        assert_eq!(pipeline.workers(), 1);
        assert_eq!(pipeline.backpressure(), Backpressure::Block);
        assert_eq!(pipeline.name(), "async:noop");
        pipeline.close().await.unwrap();
    }

    #[tokio::test]
    async fn zero_config_values_fall_back_to_defaults() {
        let config = DeliveryConfig {
            queue_capacity: 0,
            workers: 0,
            backpressure: Backpressure::Drop,
        };
        let pipeline = DeliveryPipeline::from_config(Arc::new(NoopSink), &config).unwrap();

        assert_eq!(pipeline.capacity(), DEFAULT_QUEUE_CAPACITY);
        assert_eq!(pipeline.workers(), 1);
        assert_eq!(pipeline.backpressure(), Backpressure::Drop);
        pipeline.close().await.unwrap();
    }

    #[tokio::test]
    async fn delivers_everything_before_closing_sink() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = DeliveryPipeline::builder(sink.clone())
            .with_workers(4)
            .spawn()
            .unwrap();
        let cancel = CancellationToken::new();

        for i in 0..50 {
            pipeline.write(Some(&finished(i)), &cancel).await.unwrap();
        }
        pipeline.close().await.unwrap();

        assert_eq!(sink.len(), 50);
        assert!(sink.is_closed());
        let stats = pipeline.stats();
        assert_eq!(stats.enqueued, 50);
        assert_eq!(stats.delivered, 50);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn missing_trail_and_closed_pipeline_are_no_ops() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = DeliveryPipeline::builder(sink.clone()).spawn().unwrap();
        let cancel = CancellationToken::new();

        pipeline.write(None, &cancel).await.unwrap();
        pipeline.close().await.unwrap();
        assert!(pipeline.is_closed());

        pipeline.write(Some(&finished(1)), &cancel).await.unwrap();
        assert!(sink.is_empty());
        assert_eq!(pipeline.stats().enqueued, 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let pipeline = DeliveryPipeline::builder(Arc::new(MemorySink::new()))
            .spawn()
            .unwrap();
        pipeline.close().await.unwrap();
        pipeline.close().await.unwrap();
        assert_eq!(pipeline.queue_len(), 0);
    }

    #[tokio::test]
    async fn sink_failures_reach_the_handler_only() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let pipeline = DeliveryPipeline::builder(Arc::new(RejectingSink))
            .on_error(move |err, record| {
                assert_eq!(err.kind(), SinkErrorKind::Rejected);
                assert!(record.hash.is_some());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .spawn()
            .unwrap();
        let cancel = CancellationToken::new();

        for i in 0..3 {
            assert!(pipeline.write(Some(&finished(i)), &cancel).await.is_ok());
        }
        pipeline.close().await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(pipeline.stats().failed, 3);
    }

    #[tokio::test]
    async fn snapshot_is_taken_at_write_time() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = DeliveryPipeline::builder(sink.clone()).spawn().unwrap();

        let trail = finished(1);
        pipeline
            .write(Some(&trail), &CancellationToken::new())
            .await
            .unwrap();
        trail.add_error("late", "after hand-off");
        pipeline.close().await.unwrap();

        assert!(sink.records()[0].errors.is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_token_aborts_blocking_write() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = DeliveryPipeline::builder(sink.clone()).spawn().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline.write(Some(&finished(1)), &cancel).await;
        assert_eq!(result, Err(DeliveryError::Cancelled));
        pipeline.close().await.unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn backpressure_serde_names() {
        assert_eq!(
            serde_json::to_string(&Backpressure::Drop).unwrap(),
            "\"drop\""
        );
        let parsed: Backpressure = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(parsed, Backpressure::Block);
    }
}
