//! Host-owned configuration and the components built from it.
//!
//! `Config` only carries values. Loading it from files or the environment is
//! left to the host; the struct deserializes with every field optional.
//!
//! # Examples
//!
//! ```
//! use trail_core::{Backpressure, Config};
//!
//! let config: Config = serde_json::from_str(
//!     r#"{"service_name": "orders", "sampling_rate": 0.25, "delivery": {"backpressure": "drop"}}"#,
//! )
//! .unwrap();
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.environment, "development");
//! assert_eq!(config.delivery.backpressure, Backpressure::Drop);
//! assert_eq!(config.delivery.queue_capacity, 1000);
//! ```

use serde::{Deserialize, Serialize};

use crate::body::{BodyCapture, DEFAULT_BODY_LIMIT};
use crate::delivery::Backpressure;
use crate::error::ConfigError;
use crate::header::{HeaderFilter, DEFAULT_EXCLUDED_HEADERS};
use crate::redact::{Redactor, DEFAULT_MASK_FIELDS, DEFAULT_MASK_VALUE};

/// Service tag used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "unknown-service";

/// Environment tag used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default delivery queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Capture, redaction and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service tag stamped on every trail.
    pub service_name: String,
    /// Environment tag stamped on every trail.
    pub environment: String,
    /// Request body capture ceiling in bytes.
    pub max_request_body_size: usize,
    /// Response body capture ceiling in bytes.
    pub max_response_body_size: usize,
    /// Sensitive field names, matched case-insensitively.
    pub mask_fields: Vec<String>,
    /// Replacement literal for masked values.
    pub mask_value: String,
    /// Whether body redaction is applied.
    pub enable_masking: bool,
    /// Headers whose values are masked.
    pub exclude_headers: Vec<String>,
    /// Headers allowed through. `None` allows all.
    pub include_headers: Option<Vec<String>>,
    /// Fraction of units of work that get a trail, `0.0..=1.0`.
    pub sampling_rate: f64,
    /// Freeze trails when they are finalized.
    pub immutable: bool,
    /// Delivery pipeline settings.
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            max_request_body_size: DEFAULT_BODY_LIMIT,
            max_response_body_size: DEFAULT_BODY_LIMIT,
            mask_fields: DEFAULT_MASK_FIELDS.iter().map(|f| f.to_string()).collect(),
            mask_value: DEFAULT_MASK_VALUE.to_string(),
            enable_masking: true,
            exclude_headers: DEFAULT_EXCLUDED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            include_headers: None,
            sampling_rate: 1.0,
            immutable: false,
            delivery: DeliveryConfig::default(),
        }
    }

    /// Sets the service tag.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Sets the environment tag.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Sets the request body ceiling.
    pub fn with_max_request_body_size(mut self, bytes: usize) -> Self {
        self.max_request_body_size = bytes;
        self
    }

    /// Sets the response body ceiling.
    pub fn with_max_response_body_size(mut self, bytes: usize) -> Self {
        self.max_response_body_size = bytes;
        self
    }

    /// Replaces the sensitive field list.
    pub fn with_mask_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mask_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the mask literal, used for bodies and headers alike.
    pub fn with_mask_value(mut self, value: impl Into<String>) -> Self {
        self.mask_value = value.into();
        self
    }

    /// Enables or disables body redaction.
    pub fn with_masking(mut self, enabled: bool) -> Self {
        self.enable_masking = enabled;
        self
    }

    /// Replaces the header deny-list.
    pub fn with_exclude_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a header allow-list.
    pub fn with_include_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the sampling rate.
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate;
        self
    }

    /// Freezes trails at finalize.
    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    /// Sets the delivery settings.
    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    /// Checks values that would otherwise be silently misinterpreted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSamplingRate`] for rates outside
    /// `0.0..=1.0` (including NaN) and [`ConfigError::EmptyMaskValue`] for an
    /// empty mask literal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(ConfigError::InvalidSamplingRate(self.sampling_rate));
        }
        if self.mask_value.is_empty() {
            return Err(ConfigError::EmptyMaskValue);
        }
        Ok(())
    }

    /// Builds the body redactor.
    pub fn redactor(&self) -> Redactor {
        Redactor::new()
            .with_fields(&self.mask_fields)
            .with_mask_value(self.mask_value.clone())
            .with_enabled(self.enable_masking)
    }

    /// Builds the header filter.
    pub fn header_filter(&self) -> HeaderFilter {
        let filter = HeaderFilter::new()
            .with_exclude(&self.exclude_headers)
            .with_mask_value(self.mask_value.clone());
        match &self.include_headers {
            Some(include) => filter.with_include(include),
            None => filter,
        }
    }

    /// Builds the request body capture.
    pub fn request_capture(&self) -> BodyCapture {
        BodyCapture::new(self.max_request_body_size)
    }

    /// Builds the response body capture.
    pub fn response_capture(&self) -> BodyCapture {
        BodyCapture::new(self.max_response_body_size)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Bounded queue capacity. Zero selects the default.
    pub queue_capacity: usize,
    /// Worker count. Zero is treated as one.
    pub workers: usize,
    /// Behavior when the queue is full.
    pub backpressure: Backpressure,
}

impl DeliveryConfig {
    /// Queue capacity with zero mapped to the default.
    pub fn effective_capacity(&self) -> usize {
        if self.queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            self.queue_capacity
        }
    }

    /// Worker count with zero mapped to one.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: 1,
            backpressure: Backpressure::Block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::collect_headers;
    use serde_json::json;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.service_name, "unknown-service");
        assert_eq!(config.environment, "development");
        assert_eq!(config.max_request_body_size, 65536);
        assert_eq!(config.max_response_body_size, 65536);
        assert_eq!(config.mask_value, "***MASKED***");
        assert!(config.enable_masking);
        assert_eq!(config.include_headers, None);
        assert_eq!(config.sampling_rate, 1.0);
        assert!(!config.immutable);
        assert_eq!(config.delivery, DeliveryConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = Config::default().with_sampling_rate(1.5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidSamplingRate(1.5))
        );
        assert!(Config::default()
            .with_sampling_rate(f64::NAN)
            .validate()
            .is_err());
        assert_eq!(
            Config::default().with_mask_value("").validate(),
            Err(ConfigError::EmptyMaskValue)
        );
    }

    #[test]
    fn factories_follow_settings() {
        let config = Config::default()
            .with_mask_fields(["ssn"])
            .with_mask_value("<hidden>")
            .with_exclude_headers(["x-secret"])
            .with_include_headers(["x-secret", "accept"])
            .with_max_request_body_size(10)
            .with_max_response_body_size(20);

        let masked = config.redactor().mask(json!({"ssn": "1", "password": "p"}));
        assert_eq!(masked, json!({"ssn": "<hidden>", "password": "p"}));

        let headers = collect_headers([("X-Secret", "s"), ("Accept", "*/*"), ("Cookie", "c")]);
        let filtered = config.header_filter().filter(&headers);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered["X-Secret"], vec!["<hidden>"]);

        assert_eq!(config.request_capture().limit(), 10);
        assert_eq!(config.response_capture().limit(), 20);
    }

    #[test]
    fn masking_can_be_disabled() {
        let redactor = Config::default().with_masking(false).redactor();
        assert_eq!(
            redactor.mask(json!({"password": "p"})),
            json!({"password": "p"})
        );
    }

    #[test]
    fn effective_delivery_values() {
        let delivery = DeliveryConfig {
            queue_capacity: 0,
            workers: 0,
            backpressure: Backpressure::Drop,
        };
        assert_eq!(delivery.effective_capacity(), 1000);
        assert_eq!(delivery.effective_workers(), 1);
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: Config = serde_json::from_str(r#"{"immutable": true}"#).unwrap();
        assert!(config.immutable);
        assert_eq!(config.service_name, "unknown-service");
        assert_eq!(config.exclude_headers.len(), 4);
    }
}
