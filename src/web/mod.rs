//! Web framework integration surface.
//!
//! This module is the boundary between HTTP frameworks and the capture
//! engine. It contains no framework-specific code: integrations translate
//! their request and response types into [`RequestParts`] and
//! [`ResponseParts`], and drive an [`Auditor`] through the request lifecycle.
//!
//! # Design Principles
//!
//! 1. **No Framework Dependencies**: adapters are plain owned data.
//!
//! 2. **Explicit Trail Handle**: there is no ambient "current trail". The
//!    `Option<Arc<Trail>>` returned by [`Auditor::begin`] is passed to every
//!    collaborator that wants to record onto it.
//!
//! 3. **Never Fail the Request**: capture and delivery problems degrade the
//!    audit record, never the response.
//!
//! # Example Flow
//!
//! ```ignore
//! // In a framework-specific integration (e.g., axum, actix):
//! let trail = auditor.begin(trace_id, request_id);
//! let (body, replay) = auditor.capture_request_body_async(Some(req_body)).await;
//! auditor.record_request(trail.as_deref(), RequestParts::from(&req), body);
//!
//! let resp = handler(replay, trail.clone()).await;
//!
//! let body = auditor.capture_response_body(resp.body_bytes());
//! auditor.record_response(trail.as_deref(), ResponseParts::from(&resp), body);
//! auditor.finish(trail.as_deref(), &cancel).await?;
//! ```

mod adapter;
mod middleware;

pub use adapter::{RequestParts, ResponseParts};
pub use middleware::Auditor;
