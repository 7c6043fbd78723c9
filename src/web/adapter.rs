//! Framework-neutral request and response descriptions.

use crate::header::HeaderMap;

/// The parts of an incoming request that go into a trail.
///
/// Framework integrations build this from their own request type, usually
/// through a `From` impl. Header values are stored unfiltered here; the
/// [`Auditor`](super::Auditor) filters them when recording.
///
/// # Examples
///
/// ```
/// use trail_core::web::RequestParts;
///
/// let mut parts = RequestParts::new("POST", "/orders").with_query("dry_run=1");
/// parts.add_header("Content-Type", "application/json");
/// parts.add_header("Authorization", "Bearer abc");
///
/// assert_eq!(parts.method(), "POST");
/// assert_eq!(parts.headers()["Content-Type"], vec!["application/json"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParts {
    method: String,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
}

impl RequestParts {
    /// Creates request parts with no query and no headers.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
        }
    }

    /// Sets the raw query string. An empty string means no query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    /// Replaces all headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Appends one header value. Repeated names accumulate.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Returns the method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the raw headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// The parts of an outgoing response that go into a trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseParts {
    status: u16,
    headers: HeaderMap,
}

impl ResponseParts {
    /// Creates response parts with no headers.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Replaces all headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Appends one header value.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Returns the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the raw headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}
