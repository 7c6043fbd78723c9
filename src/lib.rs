//! Hash-chained audit trails with redaction and asynchronous delivery.
//!
//! This crate builds one record per unit of work and gets it to durable
//! storage without slowing the work down:
//! - **Redaction**: sensitive fields are masked at any nesting depth
//! - **Header filtering**: allow-list projection, deny-list masking
//! - **Body capture**: bounded audit copies with exact replay of the stream
//! - **Trails**: lock-protected records that freeze on finalize and carry a
//!   deterministic content hash, optionally chained to a predecessor
//! - **Delivery**: a bounded queue and worker pool in front of a [`Sink`],
//!   with a block-or-drop policy chosen up front
//!
//! # Core Types
//!
//! - [`Trail`]: the shared record for one unit of work
//! - [`Redactor`] and [`HeaderFilter`]: value and header redaction
//! - [`BodyCapture`]: audit copy plus replay stream
//! - [`DeliveryPipeline`]: asynchronous hand-off to a [`Sink`]
//! - [`web::Auditor`]: all of the above wired together from a [`Config`]
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use trail_core::{HttpRequest, IntegrationKind, Integration, Redactor, Trail};
//!
//! let redactor = Redactor::new();
//! let trail = Trail::new("trace-123", "req-456").with_immutable(true);
//!
//! let body = redactor.mask(json!({"password": "secret", "amount": 150000}));
//! trail.set_request(HttpRequest::new("POST", "/payments").with_body(Some(body)));
//! trail.add_integration(
//!     Integration::new(IntegrationKind::Http, "card-processor").with_latency_ms(42),
//! );
//! trail.finalize();
//!
//! let record = trail.record();
//! assert_eq!(
//!     record.request.unwrap().body,
//!     Some(json!({"password": "***MASKED***", "amount": 150000}))
//! );
//! assert_eq!(record.hash, Some(trail.compute_hash()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod body;
mod config;
mod delivery;
mod error;
mod header;
mod logging;
mod redact;
mod sink;
mod trail;
pub mod web;

pub use body::{AsyncReplay, BodyCapture, CaptureFailure, CapturedBody, Replay, DEFAULT_BODY_LIMIT};
pub use config::{Config, DeliveryConfig, DEFAULT_ENVIRONMENT, DEFAULT_QUEUE_CAPACITY, DEFAULT_SERVICE_NAME};
pub use delivery::{Backpressure, DeliveryPipeline, DeliveryStats, ErrorHandler, PipelineBuilder};
pub use error::{ConfigError, DeliveryError, Error, SinkError, SinkErrorKind};
pub use header::{collect_headers, HeaderFilter, HeaderMap, DEFAULT_EXCLUDED_HEADERS};
pub use logging::TrailLog;
pub use redact::{Redactor, DEFAULT_MASK_FIELDS, DEFAULT_MASK_VALUE};
pub use sink::{FanoutSink, JsonLinesSink, MemorySink, NoopSink, Sink};
pub use trail::{
    canonical_json, record_integration, record_integration_async, trace_step, trace_step_async,
    HttpRequest, HttpResponse, Integration, IntegrationKind, IntegrationTimer, InternalStep,
    StepTimer, Trail, TrailError, TrailRecord,
};
