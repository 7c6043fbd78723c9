use std::fmt;

use crate::trail::Trail;

/// Logger bound to one trail's identifiers.
///
/// Every event carries `trace_id` and `request_id` fields so log lines can be
/// joined with the delivered trail. The logger borrows the identifiers and
/// cannot outlive the trail it was created from.
///
/// Bodies and header values must never be passed through here; log the
/// redacted trail instead.
#[derive(Debug, Clone, Copy)]
pub struct TrailLog<'a> {
    trace_id: &'a str,
    request_id: &'a str,
}

impl<'a> TrailLog<'a> {
    /// Creates a logger from raw identifiers.
    pub fn new(trace_id: &'a str, request_id: &'a str) -> Self {
        Self {
            trace_id,
            request_id,
        }
    }

    /// Creates a logger for `trail`.
    ///
    /// ```
    /// use trail_core::{Trail, TrailLog};
    ///
    /// let trail = Trail::new("trace-1", "req-1");
    /// let log = TrailLog::for_trail(&trail);
    /// log.info(format_args!("payment accepted"));
    /// assert_eq!(log.request_id(), "req-1");
    /// ```
    pub fn for_trail(trail: &'a Trail) -> Self {
        Self::new(trail.trace_id(), trail.request_id())
    }

    /// Returns the trace ID associated with this logger.
    pub fn trace_id(&self) -> &str {
        self.trace_id
    }

    /// Returns the request ID associated with this logger.
    pub fn request_id(&self) -> &str {
        self.request_id
    }

    /// Logs an info-level message.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(trace_id = %self.trace_id, request_id = %self.request_id, "{}", args);
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(trace_id = %self.trace_id, request_id = %self.request_id, "{}", args);
    }

    /// Logs an error-level message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(trace_id = %self.trace_id, request_id = %self.request_id, "{}", args);
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(trace_id = %self.trace_id, request_id = %self.request_id, "{}", args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_trail_identifiers() {
        let trail = Trail::new("trace-9", "req-9");
        let log = TrailLog::for_trail(&trail);
        assert_eq!(log.trace_id(), "trace-9");
        assert_eq!(log.request_id(), "req-9");
    }

    #[test]
    fn logging_without_subscriber_is_harmless() {
        let log = TrailLog::new("t", "r");
        log.info(format_args!("info {}", 1));
        log.warn(format_args!("warn"));
        log.error(format_args!("error"));
        log.debug(format_args!("debug"));
    }
}
