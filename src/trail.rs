//! The per-unit-of-work audit record.
//!
//! This module provides:
//! - `Trail`: the shared, lock-protected record with freeze-on-finalize
//! - `TrailRecord` and its parts: the owned wire representation
//! - `canonical_json`: the sorted-key form the content hash is taken over
//! - Step and integration timers that record onto an optional trail

mod entry;
mod hash;
mod instrument;
mod record;

pub use entry::Trail;
pub use hash::canonical_json;
pub use instrument::{
    record_integration, record_integration_async, trace_step, trace_step_async,
    IntegrationTimer, StepTimer,
};
pub use record::{
    HttpRequest, HttpResponse, Integration, IntegrationKind, InternalStep, TrailError,
    TrailRecord,
};
