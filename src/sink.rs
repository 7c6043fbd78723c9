//! Destinations that finished trails are delivered to.
//!
//! The [`Sink`] trait is the contract the delivery pipeline drains into.
//! Durability is entirely the sink's concern: the pipeline attempts each
//! write once and reports failures without retrying.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{SinkError, SinkErrorKind};
use crate::trail::TrailRecord;

/// Output destination for finished trails.
///
/// Implementations must be `Send + Sync`: a pipeline shares one sink across
/// all of its workers.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use trail_core::{Sink, SinkError, TrailRecord};
///
/// struct HttpSink {
///     client: reqwest::Client,
///     endpoint: String,
/// }
///
/// #[async_trait]
/// impl Sink for HttpSink {
///     fn name(&self) -> &str {
///         "http"
///     }
///
///     async fn write(&self, record: &TrailRecord) -> Result<(), SinkError> {
///         self.client
///             .post(&self.endpoint)
///             .json(record)
///             .send()
///             .await
///             .map_err(|e| SinkError::with_message(SinkErrorKind::Io, e.to_string()))?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs, e.g. `"stdout"` or `"kafka"`.
    fn name(&self) -> &str;

    /// Writes one trail.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the destination could not accept the trail.
    async fn write(&self, record: &TrailRecord) -> Result<(), SinkError>;

    /// Flushes and releases resources. Called once, after the last write.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if flushing failed.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl Sink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn write(&self, _record: &TrailRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that writes every trail to each of its children.
///
/// Every child is attempted even if an earlier one fails. A single failure
/// is returned as-is; several are folded into one
/// [`SinkErrorKind::Multiple`] error.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutSink {
    /// Creates a fan-out over `sinks`.
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Adds a child sink.
    pub fn add_sink(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// Returns the number of children.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` if there are no children.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

fn aggregate(failures: Vec<(String, SinkError)>) -> Result<(), SinkError> {
    let mut failures = failures.into_iter();
    match (failures.next(), failures.next()) {
        (None, _) => Ok(()),
        (Some((_, err)), None) => Err(err),
        (Some(first), Some(second)) => {
            let message = [first, second]
                .into_iter()
                .chain(failures)
                .map(|(name, err)| format!("{name}: {err}"))
                .collect::<Vec<_>>()
                .join("; ");
            Err(SinkError::with_message(SinkErrorKind::Multiple, message))
        }
    }
}

#[async_trait]
impl Sink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn write(&self, record: &TrailRecord) -> Result<(), SinkError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(err) = sink.write(record).await {
                failures.push((sink.name().to_string(), err));
            }
        }
        aggregate(failures)
    }

    async fn close(&self) -> Result<(), SinkError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(err) = sink.close().await {
                failures.push((sink.name().to_string(), err));
            }
        }
        aggregate(failures)
    }
}

/// In-memory collector, mostly useful in tests.
///
/// Writes after [`close`](Sink::close) are rejected with
/// [`SinkErrorKind::Closed`].
///
/// # Examples
///
/// ```
/// use trail_core::{MemorySink, Sink, Trail};
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # runtime.block_on(async {
/// let sink = MemorySink::new();
/// let trail = Trail::new("trace-1", "req-1");
/// trail.finalize();
///
/// sink.write(&trail.record()).await.unwrap();
/// assert_eq!(sink.records()[0].trace_id, "trace-1");
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<TrailRecord>>,
    closed: AtomicBool,
}

impl MemorySink {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far, in write order.
    pub fn records(&self) -> Vec<TrailRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of trails written.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, record: &TrailRecord) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::new(SinkErrorKind::Closed));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Writes each trail as one JSON document per line.
pub struct JsonLinesSink<W> {
    name: String,
    writer: Mutex<W>,
    pretty: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            name: "jsonl".to_string(),
            writer: Mutex::new(writer),
            pretty: false,
        }
    }

    /// Emits indented documents instead of one per line.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Overrides the name reported in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl JsonLinesSink<io::Stdout> {
    /// Sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout()).with_name("stdout")
    }
}

#[async_trait]
impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, record: &TrailRecord) -> Result<(), SinkError> {
        let mut line = if self.pretty {
            serde_json::to_vec_pretty(record)?
        } else {
            serde_json::to_vec(record)?
        };
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}
