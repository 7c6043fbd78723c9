use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use rand::Rng;
use serde_json::Value;

use super::hash;
use super::record::{HttpRequest, HttpResponse, Integration, InternalStep, TrailError, TrailRecord};
use crate::config::{Config, DEFAULT_ENVIRONMENT, DEFAULT_SERVICE_NAME};

/// The audit record of one unit of work.
///
/// A `Trail` is shared by reference between everything that takes part in
/// the unit of work (usually as `Arc<Trail>`). Mutators take `&self` and
/// serialize on an internal lock, so concurrent collaborators can append
/// steps and integrations to the same instance.
///
/// Once a trail configured as immutable has been finalized, every mutator,
/// including [`finalize`](Self::finalize) itself, is a silent no-op.
///
/// # Examples
///
/// ```
/// use trail_core::{HttpResponse, Trail};
///
/// let trail = Trail::new("trace-1", "req-1").with_immutable(true);
/// trail.set_response(HttpResponse::new(200));
/// trail.finalize();
///
/// // Frozen: ignored without error.
/// trail.add_error("handler", "too late");
///
/// let record = trail.record();
/// assert!(record.errors.is_empty());
/// assert_eq!(record.hash, Some(trail.compute_hash()));
/// ```
#[derive(Debug)]
pub struct Trail {
    trace_id: String,
    request_id: String,
    started: Instant,
    immutable: bool,
    state: RwLock<TrailState>,
}

#[derive(Debug, Clone)]
struct TrailState {
    record: TrailRecord,
    prev_hash: Option<String>,
    frozen: bool,
}

impl Trail {
    /// Creates a trail with default service and environment tags.
    pub fn new(trace_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        let request_id = request_id.into();
        let record = TrailRecord::new(
            trace_id.clone(),
            request_id.clone(),
            DEFAULT_SERVICE_NAME.to_string(),
            DEFAULT_ENVIRONMENT.to_string(),
        );

        Self {
            trace_id,
            request_id,
            started: Instant::now(),
            immutable: false,
            state: RwLock::new(TrailState {
                record,
                prev_hash: None,
                frozen: false,
            }),
        }
    }

    /// Creates a trail subject to a sampling draw.
    ///
    /// Returns `None` when the draw rejects the unit of work. A rate of `1.0`
    /// or more always creates a trail; `0.0` never does.
    pub fn create(
        trace_id: impl Into<String>,
        request_id: impl Into<String>,
        sampling_rate: f64,
    ) -> Option<Self> {
        Self::create_with_rng(trace_id, request_id, sampling_rate, &mut rand::thread_rng())
    }

    /// Like [`create`](Self::create) with a caller-supplied random source.
    pub fn create_with_rng<R: Rng + ?Sized>(
        trace_id: impl Into<String>,
        request_id: impl Into<String>,
        sampling_rate: f64,
        rng: &mut R,
    ) -> Option<Self> {
        sampled(sampling_rate, rng).then(|| Self::new(trace_id, request_id))
    }

    /// Creates a trail tagged and sampled according to `config`.
    pub fn from_config(
        trace_id: impl Into<String>,
        request_id: impl Into<String>,
        config: &Config,
    ) -> Option<Self> {
        Self::create(trace_id, request_id, config.sampling_rate).map(|trail| {
            trail
                .with_service(config.service_name.clone())
                .with_environment(config.environment.clone())
                .with_immutable(config.immutable)
        })
    }

    /// Sets the service tag.
    pub fn with_service(self, service: impl Into<String>) -> Self {
        self.write().record.service = service.into();
        self
    }

    /// Sets the environment tag.
    pub fn with_environment(self, environment: impl Into<String>) -> Self {
        self.write().record.environment = environment.into();
        self
    }

    /// Freezes the trail when it is finalized.
    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, TrailState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrailState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, f: impl FnOnce(&mut TrailState)) {
        let mut state = self.write();
        if !state.frozen {
            f(&mut state);
        }
    }

    /// Returns the trace identifier.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns the request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns `true` once the trail has been finalized as immutable.
    pub fn is_frozen(&self) -> bool {
        self.read().frozen
    }

    /// Records the incoming request, replacing any earlier one.
    pub fn set_request(&self, request: HttpRequest) {
        self.mutate(|state| state.record.request = Some(request));
    }

    /// Records the outgoing response, replacing any earlier one.
    pub fn set_response(&self, response: HttpResponse) {
        self.mutate(|state| state.record.response = Some(response));
    }

    /// Appends an internal step.
    pub fn add_internal_step(&self, step: InternalStep) {
        self.mutate(|state| state.record.internal_steps.push(step));
    }

    /// Appends an integration.
    pub fn add_integration(&self, integration: Integration) {
        self.mutate(|state| state.record.integrations.push(integration));
    }

    /// Appends an error without a code.
    pub fn add_error(&self, source: impl Into<String>, message: impl Into<String>) {
        let error = TrailError {
            source: source.into(),
            message: message.into(),
            code: None,
        };
        self.mutate(|state| state.record.errors.push(error));
    }

    /// Appends an error with a machine-readable code.
    pub fn add_error_with_code(
        &self,
        source: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) {
        let error = TrailError {
            source: source.into(),
            message: message.into(),
            code: Some(code.into()),
        };
        self.mutate(|state| state.record.errors.push(error));
    }

    /// Sets a metadata entry. The last write for a key wins.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        self.mutate(|state| {
            state.record.metadata.insert(key, value);
        });
    }

    /// Links this trail to its predecessor's hash.
    pub fn set_previous_hash(&self, hash: impl Into<String>) {
        let hash = hash.into();
        self.mutate(|state| state.prev_hash = Some(hash));
    }

    /// Returns the predecessor's hash, if linked.
    pub fn previous_hash(&self) -> Option<String> {
        self.read().prev_hash.clone()
    }

    /// Completes the trail.
    ///
    /// Sets the latency to the time elapsed since creation, freezes the trail
    /// if it was built as immutable, and stores the content hash.
    pub fn finalize(&self) {
        let latency_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let immutable = self.immutable;
        self.mutate(|state| {
            state.record.latency_ms = latency_ms;
            state.frozen = immutable;
            let digest = hash::digest(&state.record, state.prev_hash.as_deref());
            state.record.hash = Some(digest);
        });
    }

    /// Computes the content hash of the current state.
    ///
    /// Pure: repeated calls on an unchanged trail return the same digest.
    pub fn compute_hash(&self) -> String {
        let state = self.read();
        hash::digest(&state.record, state.prev_hash.as_deref())
    }

    /// Returns the stored hash, set by [`finalize`](Self::finalize).
    pub fn hash(&self) -> Option<String> {
        self.read().record.hash.clone()
    }

    /// Returns the latency recorded at finalize, or zero before it.
    pub fn latency_ms(&self) -> u64 {
        self.read().record.latency_ms
    }

    /// Returns an owned snapshot in wire form.
    pub fn record(&self) -> TrailRecord {
        self.read().record.clone()
    }
}

impl Clone for Trail {
    /// Deep copy. The clone shares nothing with the original, including its lock.
    fn clone(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            request_id: self.request_id.clone(),
            started: self.started,
            immutable: self.immutable,
            state: RwLock::new(self.read().clone()),
        }
    }
}

fn sampled<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> bool {
    rate >= 1.0 || rng.gen::<f64>() < rate
}
