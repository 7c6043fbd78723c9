//! Request/response auditing built from the capture components.
//!
//! # Integration Flow
//!
//! ```text
//! Incoming request
//!   ↓
//! Auditor::begin(trace_id, request_id)      → Option<Arc<Trail>>
//!   ↓
//! Auditor::capture_request_body(body)       → audit value + replay stream
//!   ↓
//! Auditor::record_request(trail, parts, body)
//!   ↓
//! Handler runs with the replay stream and the trail handle
//!   ↓
//! Auditor::record_response(trail, parts, capture_response_body(bytes))
//!   ↓
//! Auditor::finish(trail, cancel)            → finalize + hand to pipeline
//! ```
//!
//! Every step accepts a missing trail, so an unsampled request flows through
//! the same code without recording anything.

use std::io::Read;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::body::{AsyncReplay, BodyCapture, Replay};
use crate::config::Config;
use crate::delivery::{DeliveryPipeline, DeliveryStats};
use crate::error::{DeliveryError, Error, SinkError};
use crate::header::HeaderFilter;
use crate::logging::TrailLog;
use crate::redact::Redactor;
use crate::sink::Sink;
use crate::trail::{HttpRequest, HttpResponse, Trail};

use super::{RequestParts, ResponseParts};

/// Composes sampling, redaction, header filtering, body capture and delivery
/// for one service.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use trail_core::web::{Auditor, RequestParts, ResponseParts};
/// use trail_core::{Config, MemorySink};
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # runtime.block_on(async {
/// let sink = Arc::new(MemorySink::new());
/// let auditor = Auditor::spawn(Config::default(), sink.clone()).unwrap();
///
/// let trail = auditor.begin("trace-1", "req-1");
/// let (body, _replay) = auditor.capture_request_body(Some(&br#"{"password":"hunter2"}"#[..]));
/// auditor.record_request(trail.as_deref(), RequestParts::new("POST", "/login"), body);
/// auditor.record_response(trail.as_deref(), ResponseParts::new(204), None);
/// auditor.finish(trail.as_deref(), &CancellationToken::new()).await.unwrap();
///
/// auditor.shutdown().await.unwrap();
/// let record = &sink.records()[0];
/// assert_eq!(record.request.as_ref().unwrap().body, Some(serde_json::json!({"password": "***MASKED***"})));
/// # });
/// ```
#[derive(Debug)]
pub struct Auditor {
    config: Config,
    redactor: Redactor,
    header_filter: HeaderFilter,
    request_capture: BodyCapture,
    response_capture: BodyCapture,
    pipeline: DeliveryPipeline,
}

impl Auditor {
    /// Builds an auditor around an already running pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` does not validate.
    pub fn new(config: Config, pipeline: DeliveryPipeline) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            redactor: config.redactor(),
            header_filter: config.header_filter(),
            request_capture: config.request_capture(),
            response_capture: config.response_capture(),
            config,
            pipeline,
        })
    }

    /// Validates `config` and starts a pipeline to `sink` from its delivery settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration and
    /// [`Error::Delivery`] when called outside a Tokio runtime.
    pub fn spawn(config: Config, sink: Arc<dyn Sink>) -> Result<Self, Error> {
        config.validate()?;
        let pipeline = DeliveryPipeline::from_config(sink, &config.delivery)?;
        Self::new(config, pipeline)
    }

    /// Starts a trail for one request, subject to sampling.
    pub fn begin(
        &self,
        trace_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Option<Arc<Trail>> {
        Trail::from_config(trace_id, request_id, &self.config).map(Arc::new)
    }

    /// Captures a blocking request body.
    ///
    /// Returns the redacted audit value and the stream the handler should
    /// read instead of the original. A failed read yields no audit value but
    /// still returns a replay stream.
    pub fn capture_request_body<R: Read>(
        &self,
        source: Option<R>,
    ) -> (Option<Value>, Option<Replay<R>>) {
        match self.request_capture.capture(source) {
            Ok(Some(captured)) => {
                let truncated = captured.truncated();
                let (bytes, replay) = captured.into_parts();
                (self.redactor.mask_captured(&bytes, truncated), Some(replay))
            }
            Ok(None) => (None, None),
            Err(failure) => {
                tracing::debug!(error = %failure.error(), "request body capture failed");
                (None, Some(failure.into_replay()))
            }
        }
    }

    /// Async counterpart of [`capture_request_body`](Self::capture_request_body).
    pub async fn capture_request_body_async<R: AsyncRead + Unpin>(
        &self,
        source: Option<R>,
    ) -> (Option<Value>, Option<AsyncReplay<R>>) {
        match self.request_capture.capture_async(source).await {
            Ok(Some(captured)) => {
                let truncated = captured.truncated();
                let (bytes, replay) = captured.into_parts();
                (self.redactor.mask_captured(&bytes, truncated), Some(replay))
            }
            Ok(None) => (None, None),
            Err(failure) => {
                tracing::debug!(error = %failure.error(), "request body capture failed");
                (None, Some(failure.into_replay()))
            }
        }
    }

    /// Converts response bytes into an audit value.
    ///
    /// Only the first `max_response_body_size` bytes are considered. A cut
    /// body that does not parse is recorded as a length marker.
    pub fn capture_response_body(&self, bytes: &[u8]) -> Option<Value> {
        let limit = self.response_capture.limit();
        if bytes.len() > limit {
            self.redactor.mask_captured(&bytes[..limit], true)
        } else {
            self.redactor.mask_body(bytes)
        }
    }

    /// Records the request with filtered headers.
    pub fn record_request(&self, trail: Option<&Trail>, parts: RequestParts, body: Option<Value>) {
        let Some(trail) = trail else {
            return;
        };
        let mut request = HttpRequest::new(parts.method(), parts.path())
            .with_headers(self.header_filter.filter(parts.headers()))
            .with_body(body);
        request.query = parts.query().map(str::to_string);
        trail.set_request(request);
    }

    /// Records the response with filtered headers.
    pub fn record_response(
        &self,
        trail: Option<&Trail>,
        parts: ResponseParts,
        body: Option<Value>,
    ) {
        let Some(trail) = trail else {
            return;
        };
        let response = HttpResponse::new(parts.status())
            .with_headers(self.header_filter.filter(parts.headers()))
            .with_body(body);
        trail.set_response(response);
    }

    /// Finalizes the trail and hands it to the delivery pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Cancelled`] if `cancel` fired while waiting
    /// for queue space.
    pub async fn finish(
        &self,
        trail: Option<&Trail>,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let Some(trail) = trail else {
            return Ok(());
        };
        trail.finalize();

        let result = self.pipeline.write(Some(trail), cancel).await;
        if let Err(err) = &result {
            TrailLog::for_trail(trail).warn(format_args!("trail not enqueued: {err}"));
        }
        result
    }

    /// Drains pending trails and closes the sink.
    ///
    /// # Errors
    ///
    /// Returns the sink's close error.
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        self.pipeline.close().await
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the delivery counters.
    pub fn stats(&self) -> DeliveryStats {
        self.pipeline.stats()
    }

    /// Returns the delivery pipeline.
    pub fn pipeline(&self) -> &DeliveryPipeline {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::collect_headers;
    use crate::sink::MemorySink;
    use serde_json::json;

    fn auditor(config: Config) -> (Auditor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let auditor = Auditor::spawn(config, sink.clone()).unwrap();
        (auditor, sink)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let sink = Arc::new(MemorySink::new());
        let err = Auditor::spawn(Config::default().with_sampling_rate(2.0), sink).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn full_request_is_recorded_and_delivered() {
        let (auditor, sink) = auditor(Config::default().with_service_name("orders"));
        let cancel = CancellationToken::new();

        let trail = auditor.begin("trace-1", "req-1");
        let (body, replay) =
            auditor.capture_request_body(Some(&br#"{"password":"secret","amount":150000}"#[..]));

        let mut forwarded = Vec::new();
        replay.unwrap().read_to_end(&mut forwarded).unwrap();
        assert_eq!(forwarded, br#"{"password":"secret","amount":150000}"#);

        let parts = RequestParts::new("POST", "/orders")
            .with_query("dry_run=1")
            .with_headers(collect_headers([("Authorization", "Bearer abc"), ("X-Test", "ok")]));
        auditor.record_request(trail.as_deref(), parts, body);

        let response_body = auditor.capture_response_body(br#"{"id":1,"token":"t"}"#);
        auditor.record_response(trail.as_deref(), ResponseParts::new(201), response_body);
        auditor.finish(trail.as_deref(), &cancel).await.unwrap();
        auditor.shutdown().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.service, "orders");

        let request = record.request.as_ref().unwrap();
        assert_eq!(request.query.as_deref(), Some("dry_run=1"));
        assert_eq!(request.body, Some(json!({"password": "***MASKED***", "amount": 150000})));
        assert_eq!(request.headers["Authorization"], vec!["***MASKED***"]);
        assert_eq!(request.headers["X-Test"], vec!["ok"]);

        let response = record.response.as_ref().unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, Some(json!({"id": 1, "token": "***MASKED***"})));
        assert!(record.hash.is_some());
    }

    #[tokio::test]
    async fn unsampled_request_records_nothing() {
        let (auditor, sink) = auditor(Config::default().with_sampling_rate(0.0));
        let trail = auditor.begin("trace", "req");
        assert!(trail.is_none());

        auditor.record_request(trail.as_deref(), RequestParts::new("GET", "/"), None);
        auditor.record_response(trail.as_deref(), ResponseParts::new(200), None);
        auditor
            .finish(trail.as_deref(), &CancellationToken::new())
            .await
            .unwrap();
        auditor.shutdown().await.unwrap();

        assert!(sink.is_empty());
        assert_eq!(auditor.stats().enqueued, 0);
    }

    #[tokio::test]
    async fn response_body_is_cut_at_limit() {
        let (auditor, _sink) = auditor(Config::default().with_max_response_body_size(5));
        assert_eq!(
            auditor.capture_response_body(b"abcdefgh"),
            Some(json!("[truncated body: 5 bytes captured]"))
        );
        assert_eq!(auditor.capture_response_body(b"abcde"), Some(json!("abcde")));
        assert_eq!(auditor.capture_response_body(b""), None);
        auditor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn async_request_body_capture() {
        let (auditor, _sink) = auditor(Config::default().with_max_request_body_size(4));
        let (body, replay) = auditor
            .capture_request_body_async(Some(&b"plain text"[..]))
            .await;
        assert_eq!(body, Some(json!("[truncated body: 4 bytes captured]")));

        let mut forwarded = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut replay.unwrap(), &mut forwarded)
            .await
            .unwrap();
        assert_eq!(forwarded, b"plain text");
        auditor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn truncated_request_body_keeps_secrets_out_of_the_record() {
        let (auditor, sink) = auditor(Config::default().with_max_request_body_size(40));
        let raw = format!(r#"{{"password":"hunter2","note":"{}"}}"#, "x".repeat(64));

        let trail = auditor.begin("trace-cut", "req-cut");
        let (body, replay) = auditor.capture_request_body(Some(raw.as_bytes()));
        assert_eq!(body, Some(json!("[truncated body: 40 bytes captured]")));

        let mut forwarded = Vec::new();
        replay.unwrap().read_to_end(&mut forwarded).unwrap();
        assert_eq!(forwarded, raw.as_bytes());

        auditor.record_request(trail.as_deref(), RequestParts::new("POST", "/login"), body);
        auditor
            .finish(trail.as_deref(), &CancellationToken::new())
            .await
            .unwrap();
        auditor.shutdown().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let rendered = serde_json::to_string(&records[0]).unwrap();
        assert!(!rendered.contains("hunter2"), "secret leaked: {rendered}");
    }

    #[tokio::test]
    async fn truncated_response_body_keeps_secrets_out_of_the_record() {
        let (auditor, _sink) = auditor(Config::default().with_max_response_body_size(24));
        let body = auditor.capture_response_body(br#"{"token":"tok_live_123456","id":7}"#);
        assert_eq!(body, Some(json!("[truncated body: 24 bytes captured]")));
        auditor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn immutable_trail_rejects_late_changes() {
        let (auditor, sink) = auditor(Config::default().with_immutable(true));
        let trail = auditor.begin("trace", "req");
        auditor
            .finish(trail.as_deref(), &CancellationToken::new())
            .await
            .unwrap();

        let trail = trail.unwrap();
        trail.add_error("late", "ignored");
        assert!(trail.record().errors.is_empty());
        auditor.shutdown().await.unwrap();
        assert_eq!(sink.len(), 1);
    }
}
