//! Timers and wrappers that record steps and integrations on a trail.
//!
//! Every helper takes the trail as `Option<&Trail>`: when the unit of work
//! was not sampled, the wrapped operation still runs and nothing is recorded.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use super::entry::Trail;
use super::record::{Integration, IntegrationKind, InternalStep};

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn outcome_parts<T: Serialize, E: Display>(result: &Result<T, E>) -> (Option<Value>, Option<String>) {
    match result {
        Ok(value) => (serde_json::to_value(value).ok(), None),
        Err(err) => (None, Some(err.to_string())),
    }
}

/// Measures one internal step.
#[derive(Debug)]
pub struct StepTimer {
    name: String,
    request: Option<Value>,
    started: Instant,
}

impl StepTimer {
    /// Starts timing a step.
    pub fn start(name: impl Into<String>, request: Option<Value>) -> Self {
        Self {
            name: name.into(),
            request,
            started: Instant::now(),
        }
    }

    /// Stops the timer and builds the step.
    pub fn finish(self, response: Option<Value>, error: Option<String>) -> InternalStep {
        InternalStep {
            name: self.name,
            latency_ms: elapsed_ms(self.started),
            request: self.request,
            response,
            error,
        }
    }

    /// Stops the timer and appends the step to `trail`, if any.
    pub fn record(self, trail: Option<&Trail>, response: Option<Value>, error: Option<String>) {
        if let Some(trail) = trail {
            trail.add_internal_step(self.finish(response, error));
        }
    }
}

/// Measures one call to an external dependency.
#[derive(Debug)]
pub struct IntegrationTimer {
    kind: IntegrationKind,
    name: String,
    request: Option<Value>,
    metadata: BTreeMap<String, Value>,
    started: Instant,
}

impl IntegrationTimer {
    /// Starts timing a call.
    pub fn start(kind: IntegrationKind, name: impl Into<String>, request: Option<Value>) -> Self {
        Self {
            kind,
            name: name.into(),
            request,
            metadata: BTreeMap::new(),
            started: Instant::now(),
        }
    }

    /// Attaches a metadata entry to the eventual integration record.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stops the timer and builds the integration record.
    pub fn finish(self, response: Option<Value>, error: Option<String>) -> Integration {
        Integration {
            kind: self.kind,
            name: self.name,
            latency_ms: elapsed_ms(self.started),
            request: self.request,
            response,
            error,
            metadata: self.metadata,
        }
    }

    /// Stops the timer and appends the integration to `trail`, if any.
    pub fn record(self, trail: Option<&Trail>, response: Option<Value>, error: Option<String>) {
        if let Some(trail) = trail {
            trail.add_integration(self.finish(response, error));
        }
    }
}

/// Runs `f` as a named internal step.
///
/// The step's response is the serialized `Ok` value, or its error text on
/// `Err`. The closure's result is returned unchanged.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use trail_core::{trace_step, Trail};
///
/// let trail = Trail::new("trace-1", "req-1");
/// let total: Result<u32, String> =
///     trace_step(Some(&trail), "sum", Some(json!([1, 2])), || Ok(3));
///
/// assert_eq!(total, Ok(3));
/// assert_eq!(trail.record().internal_steps[0].response, Some(json!(3)));
/// ```
pub fn trace_step<T, E, F>(
    trail: Option<&Trail>,
    name: &str,
    request: Option<Value>,
    f: F,
) -> Result<T, E>
where
    T: Serialize,
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let Some(trail) = trail else {
        return f();
    };
    let timer = StepTimer::start(name, request);
    let result = f();
    let (response, error) = outcome_parts(&result);
    timer.record(Some(trail), response, error);
    result
}

/// Async counterpart of [`trace_step`].
pub async fn trace_step_async<T, E, Fut>(
    trail: Option<&Trail>,
    name: &str,
    request: Option<Value>,
    fut: Fut,
) -> Result<T, E>
where
    T: Serialize,
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    let Some(trail) = trail else {
        return fut.await;
    };
    let timer = StepTimer::start(name, request);
    let result = fut.await;
    let (response, error) = outcome_parts(&result);
    timer.record(Some(trail), response, error);
    result
}

/// Runs `f` as a call to an external dependency and records it.
pub fn record_integration<T, E, F>(
    trail: Option<&Trail>,
    kind: IntegrationKind,
    name: &str,
    request: Option<Value>,
    f: F,
) -> Result<T, E>
where
    T: Serialize,
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let Some(trail) = trail else {
        return f();
    };
    let timer = IntegrationTimer::start(kind, name, request);
    let result = f();
    let (response, error) = outcome_parts(&result);
    timer.record(Some(trail), response, error);
    result
}

/// Async counterpart of [`record_integration`].
pub async fn record_integration_async<T, E, Fut>(
    trail: Option<&Trail>,
    kind: IntegrationKind,
    name: &str,
    request: Option<Value>,
    fut: Fut,
) -> Result<T, E>
where
    T: Serialize,
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    let Some(trail) = trail else {
        return fut.await;
    };
    let timer = IntegrationTimer::start(kind, name, request);
    let result = fut.await;
    let (response, error) = outcome_parts(&result);
    timer.record(Some(trail), response, error);
    result
}
