//! Wire representation of a trail and its components.
//!
//! These are plain data carriers. Bodies, payloads and metadata are generic
//! structured values and are expected to be redacted before they are stored.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::header::HeaderMap;

/// Snapshot of the incoming request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Request method, e.g. `POST`.
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// Raw query string, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Filtered request headers.
    #[serde(default, skip_serializing_if = "HeaderMap::is_empty")]
    pub headers: HeaderMap,
    /// Redacted request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a request snapshot with no query, headers or body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets the query string. Empty strings are treated as no query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    /// Sets the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body value.
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }
}

/// Snapshot of the outgoing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Filtered response headers.
    #[serde(default, skip_serializing_if = "HeaderMap::is_empty")]
    pub headers: HeaderMap,
    /// Redacted response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl HttpResponse {
    /// Creates a response snapshot with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body value.
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }
}

/// A recorded unit of in-process work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalStep {
    /// Step name.
    pub name: String,
    /// Elapsed time in milliseconds.
    pub latency_ms: u64,
    /// Input to the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// Output of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Error text, if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InternalStep {
    /// Creates a step with zero latency and no payloads.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency_ms: 0,
            request: None,
            response: None,
            error: None,
        }
    }

    /// Sets the latency.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Sets the request payload.
    pub fn with_request(mut self, request: Value) -> Self {
        self.request = Some(request);
        self
    }

    /// Sets the response payload.
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Sets the error text.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Category of an external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    /// Outbound HTTP call.
    Http,
    /// Message queue or stream.
    Queue,
    /// Database query.
    Database,
    /// Cache lookup or write.
    Cache,
    /// Remote procedure call.
    Rpc,
    /// Anything else.
    Custom,
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationKind::Http => write!(f, "http"),
            IntegrationKind::Queue => write!(f, "queue"),
            IntegrationKind::Database => write!(f, "database"),
            IntegrationKind::Cache => write!(f, "cache"),
            IntegrationKind::Rpc => write!(f, "rpc"),
            IntegrationKind::Custom => write!(f, "custom"),
        }
    }
}

/// A recorded call to an external dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    /// Dependency category.
    #[serde(rename = "type")]
    pub kind: IntegrationKind,
    /// Dependency name, e.g. `payments-api` or `orders.insert`.
    pub name: String,
    /// Elapsed time in milliseconds.
    pub latency_ms: u64,
    /// Outbound payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// Inbound payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Error text, if the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form attributes such as topic, table or cache key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Integration {
    /// Creates an integration record with zero latency and no payloads.
    pub fn new(kind: IntegrationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            latency_ms: 0,
            request: None,
            response: None,
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the latency.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Sets the outbound payload.
    pub fn with_request(mut self, request: Value) -> Self {
        self.request = Some(request);
        self
    }

    /// Sets the inbound payload.
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Sets the error text.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Adds a metadata entry, replacing any previous value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An error observed during the unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailError {
    /// Component that reported the error.
    pub source: String,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Point-in-time copy of a trail, in wire form.
///
/// This is what sinks receive. It owns all of its data, so later changes to
/// the originating [`Trail`](crate::Trail) are never visible through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailRecord {
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Distributed trace identifier.
    pub trace_id: String,
    /// Request identifier.
    pub request_id: String,
    /// Service tag.
    pub service: String,
    /// Environment tag.
    pub environment: String,
    /// Incoming request, once recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpRequest>,
    /// Outgoing response, once recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponse>,
    /// Total elapsed time, set at finalize.
    pub latency_ms: u64,
    /// Internal steps in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_steps: Vec<InternalStep>,
    /// Integrations in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integrations: Vec<Integration>,
    /// Errors in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<TrailError>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Content hash, set at finalize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl TrailRecord {
    pub(crate) fn new(
        trace_id: String,
        request_id: String,
        service: String,
        environment: String,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            trace_id,
            request_id,
            service,
            environment,
            request: None,
            response: None,
            latency_ms: 0,
            internal_steps: Vec::new(),
            integrations: Vec::new(),
            errors: Vec::new(),
            metadata: BTreeMap::new(),
            hash: None,
        }
    }
}
