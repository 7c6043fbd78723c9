//! Backpressure and shutdown behavior of the delivery pipeline.
//!
//! These tests park the workers inside a gated sink so the queue can be
//! filled deterministically.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use trail_core::{
    Backpressure, DeliveryError, DeliveryPipeline, Sink, SinkError, Trail, TrailRecord,
};

const WAIT: Duration = Duration::from_secs(5);

/// Sink whose writes announce themselves, then wait for a permit.
struct GatedSink {
    entered: mpsc::UnboundedSender<String>,
    gate: Semaphore,
    records: Mutex<Vec<TrailRecord>>,
    seen_at_close: AtomicUsize,
}

impl GatedSink {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (entered, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            entered,
            gate: Semaphore::new(0),
            records: Mutex::new(Vec::new()),
            seen_at_close: AtomicUsize::new(usize::MAX),
        });
        (sink, rx)
    }

    fn open(&self) {
        self.gate.add_permits(1 << 20);
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink for GatedSink {
    fn name(&self) -> &str {
        "gated"
    }

    async fn write(&self, record: &TrailRecord) -> Result<(), SinkError> {
        let _ = self.entered.send(record.trace_id.clone());
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.seen_at_close.store(self.len(), Ordering::SeqCst);
        Ok(())
    }
}

fn finished(id: usize) -> Trail {
    let trail = Trail::new(format!("trace-{id}"), format!("req-{id}"));
    trail.finalize();
    trail
}

async fn stall_single_worker(
    pipeline: &DeliveryPipeline,
    entered: &mut mpsc::UnboundedReceiver<String>,
) {
    pipeline
        .write(Some(&finished(0)), &CancellationToken::new())
        .await
        .unwrap();
    let first = timeout(WAIT, entered.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("trace-0"));
}

#[tokio::test]
async fn drop_mode_discards_overflow_without_waiting() {
    const CAPACITY: usize = 4;
    let (sink, mut entered) = GatedSink::new();
    let pipeline = DeliveryPipeline::builder(sink.clone())
        .with_capacity(CAPACITY)
        .with_workers(1)
        .with_backpressure(Backpressure::Drop)
        .spawn()
        .unwrap();

    stall_single_worker(&pipeline, &mut entered).await;

    let cancel = CancellationToken::new();
    let burst = async {
        for i in 1..=CAPACITY + 5 {
            pipeline.write(Some(&finished(i)), &cancel).await.unwrap();
        }
    };
    timeout(WAIT, burst).await.unwrap();

    let stats = pipeline.stats();
    assert_eq!(stats.enqueued, CAPACITY as u64 + 1);
    assert_eq!(stats.dropped, 5);
    assert_eq!(pipeline.queue_len(), CAPACITY);

    sink.open();
    pipeline.close().await.unwrap();

    assert_eq!(sink.len(), CAPACITY + 1);
    assert_eq!(pipeline.stats().delivered, CAPACITY as u64 + 1);
}

#[tokio::test]
async fn block_mode_waits_for_space() {
    let (sink, mut entered) = GatedSink::new();
    let pipeline = DeliveryPipeline::builder(sink.clone())
        .with_capacity(1)
        .with_workers(1)
        .spawn()
        .unwrap();
    let cancel = CancellationToken::new();

    stall_single_worker(&pipeline, &mut entered).await;
    pipeline.write(Some(&finished(1)), &cancel).await.unwrap();

    let blocked = timeout(
        Duration::from_millis(50),
        pipeline.write(Some(&finished(2)), &cancel),
    )
    .await;
    assert!(blocked.is_err(), "write should wait while the queue is full");

    let third = finished(3);
    let (written, ()) = tokio::join!(pipeline.write(Some(&third), &cancel), async {
        sleep(Duration::from_millis(20)).await;
        sink.open();
    });
    assert_eq!(written, Ok(()));

    pipeline.close().await.unwrap();
    let delivered: Vec<String> = sink
        .records
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.trace_id.clone())
        .collect();
    assert_eq!(delivered, vec!["trace-0", "trace-1", "trace-3"]);
}

#[tokio::test]
async fn cancellation_aborts_a_blocked_write() {
    let (sink, mut entered) = GatedSink::new();
    let pipeline = DeliveryPipeline::builder(sink.clone())
        .with_capacity(1)
        .with_workers(1)
        .with_backpressure(Backpressure::Block)
        .spawn()
        .unwrap();

    stall_single_worker(&pipeline, &mut entered).await;
    pipeline
        .write(Some(&finished(1)), &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = timeout(WAIT, pipeline.write(Some(&finished(2)), &cancel))
        .await
        .unwrap();
    assert_eq!(result, Err(DeliveryError::Cancelled));

    sink.open();
    pipeline.close().await.unwrap();
    assert_eq!(sink.len(), 2);
    assert_eq!(pipeline.stats().enqueued, 2);
}

#[tokio::test]
async fn workers_write_concurrently() {
    const WORKERS: usize = 4;
    let (sink, mut entered) = GatedSink::new();
    let pipeline = DeliveryPipeline::builder(sink.clone())
        .with_workers(WORKERS)
        .spawn()
        .unwrap();
    let cancel = CancellationToken::new();

    for i in 0..WORKERS {
        pipeline.write(Some(&finished(i)), &cancel).await.unwrap();
    }

    // Every worker is parked inside the sink at the same time.
    let mut inside = Vec::new();
    for _ in 0..WORKERS {
        inside.push(timeout(WAIT, entered.recv()).await.unwrap().unwrap());
    }
    inside.sort();
    assert_eq!(inside, vec!["trace-0", "trace-1", "trace-2", "trace-3"]);
    assert_eq!(sink.len(), 0);

    sink.open();
    pipeline.close().await.unwrap();
    assert_eq!(sink.len(), WORKERS);
}

#[tokio::test]
async fn sink_is_closed_only_after_the_queue_drains() {
    let (sink, _entered) = GatedSink::new();
    let pipeline = DeliveryPipeline::builder(sink.clone())
        .with_capacity(64)
        .with_workers(2)
        .spawn()
        .unwrap();
    let cancel = CancellationToken::new();

    for i in 0..20 {
        pipeline.write(Some(&finished(i)), &cancel).await.unwrap();
    }
    sink.open();
    pipeline.close().await.unwrap();

    assert_eq!(sink.seen_at_close.load(Ordering::SeqCst), 20);
    assert!(pipeline.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_close_calls_settle_once() {
    let (sink, _entered) = GatedSink::new();
    sink.open();
    let pipeline = Arc::new(DeliveryPipeline::builder(sink.clone()).spawn().unwrap());
    let cancel = CancellationToken::new();

    for i in 0..10 {
        pipeline.write(Some(&finished(i)), &cancel).await.unwrap();
    }

    let closers: Vec<_> = (0..3)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.close().await })
        })
        .collect();
    for closer in closers {
        closer.await.unwrap().unwrap();
    }

    assert_eq!(sink.len(), 10);
    assert_eq!(sink.seen_at_close.load(Ordering::SeqCst), 10);
}

/// Sink that counts writes arriving after it was closed.
#[derive(Default)]
struct ClosingSink {
    closed: AtomicBool,
    written: AtomicUsize,
    late: AtomicUsize,
}

#[async_trait]
impl Sink for ClosingSink {
    fn name(&self) -> &str {
        "closing"
    }

    async fn write(&self, _record: &TrailRecord) -> Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            self.late.fetch_add(1, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn writes_racing_close(backpressure: Backpressure) {
    const WRITERS: usize = 8;
    const PER_WRITER: usize = 50;

    for round in 0..20 {
        let sink = Arc::new(ClosingSink::default());
        let pipeline = Arc::new(
            DeliveryPipeline::builder(sink.clone())
                .with_capacity(8)
                .with_workers(2)
                .with_backpressure(backpressure)
                .spawn()
                .unwrap(),
        );

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    let cancel = CancellationToken::new();
                    for i in 0..PER_WRITER {
                        let trail = finished(w * PER_WRITER + i);
                        let _ = pipeline.write(Some(&trail), &cancel).await;
                    }
                })
            })
            .collect();

        let closer = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                pipeline.close().await
            })
        };

        for writer in writers {
            timeout(WAIT, writer).await.unwrap().unwrap();
        }
        timeout(WAIT, closer).await.unwrap().unwrap().unwrap();

        assert_eq!(
            sink.late.load(Ordering::SeqCst),
            0,
            "round {round}: sink written after close ({backpressure:?})"
        );
        let stats = pipeline.stats();
        assert_eq!(stats.delivered, sink.written.load(Ordering::SeqCst) as u64);
        assert_eq!(stats.enqueued, stats.delivered + stats.failed);
        assert_eq!(pipeline.queue_len(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn block_mode_writes_racing_close_never_reach_a_closed_sink() {
    writes_racing_close(Backpressure::Block).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drop_mode_writes_racing_close_never_reach_a_closed_sink() {
    writes_racing_close(Backpressure::Drop).await;
}
