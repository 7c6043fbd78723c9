//! Field-name based redaction of captured values.
//!
//! Masking works on `serde_json::Value` trees, so it applies equally to
//! request bodies, response bodies and step payloads.

use std::collections::HashSet;

use serde_json::Value;

use crate::header::HeaderMap;

/// Field names masked by default (matched case-insensitively).
pub const DEFAULT_MASK_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "apikey",
    "authorization",
    "credit_card",
    "creditcard",
    "cvv",
    "pin",
];

/// Literal substituted for masked values by default.
pub const DEFAULT_MASK_VALUE: &str = "***MASKED***";

/// Field-name based redaction over generic structured values.
///
/// Any object key whose lower-cased form is a sensitive field has its
/// **entire** value replaced by the mask literal, whether that value is a
/// scalar, an object or an array. The masked subtree is never descended into.
/// Every other key, and every array element, is redacted recursively.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use trail_core::Redactor;
///
/// let redactor = Redactor::new();
/// let masked = redactor.mask(json!({"password": "secret", "amount": 150000}));
///
/// assert_eq!(masked, json!({"password": "***MASKED***", "amount": 150000}));
/// ```
#[derive(Debug, Clone)]
pub struct Redactor {
    fields: HashSet<String>,
    mask_value: String,
    enabled: bool,
}

impl Redactor {
    /// Creates a redactor with the default sensitive fields and mask literal.
    pub fn new() -> Self {
        Self {
            fields: DEFAULT_MASK_FIELDS.iter().map(|f| f.to_string()).collect(),
            mask_value: DEFAULT_MASK_VALUE.to_string(),
            enabled: true,
        }
    }

    /// Replaces the sensitive field set.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fields = fields
            .into_iter()
            .map(|f| f.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Sets the replacement literal.
    pub fn with_mask_value(mut self, value: impl Into<String>) -> Self {
        self.mask_value = value.into();
        self
    }

    /// Enables or disables redaction. A disabled redactor is the identity.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Adds a sensitive field.
    pub fn add_field(&mut self, field: &str) {
        self.fields.insert(field.to_lowercase());
    }

    /// Removes a sensitive field.
    pub fn remove_field(&mut self, field: &str) {
        self.fields.remove(&field.to_lowercase());
    }

    /// Enables or disables redaction in place.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns whether redaction is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the replacement literal.
    pub fn mask_value(&self) -> &str {
        &self.mask_value
    }

    /// Returns `true` if values under `field` would be masked.
    pub fn should_mask(&self, field: &str) -> bool {
        self.enabled && self.fields.contains(&field.to_lowercase())
    }

    /// Redacts a value, returning the masked copy.
    pub fn mask(&self, mut value: Value) -> Value {
        if self.enabled {
            self.mask_in_place(&mut value);
        }
        value
    }

    fn mask_in_place(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, nested) in map.iter_mut() {
                    if self.should_mask(key) {
                        *nested = Value::String(self.mask_value.clone());
                    } else {
                        self.mask_in_place(nested);
                    }
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.mask_in_place(item);
                }
            }
            _ => {}
        }
    }

    /// Parses structured bytes and redacts the result.
    ///
    /// Empty input yields `Ok(None)`. When redaction is disabled the parsed
    /// value is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input. Callers capturing a body
    /// should fall back to an opaque string instead, see [`mask_body`](Self::mask_body).
    pub fn parse_and_mask(&self, bytes: &[u8]) -> Result<Option<Value>, serde_json::Error> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Some(self.mask(value)))
    }

    /// Redacts serialized bytes, returning re-serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input.
    pub fn mask_json(&self, bytes: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
        if !self.enabled || bytes.is_empty() {
            return Ok(bytes.to_vec());
        }
        let value: Value = serde_json::from_slice(bytes)?;
        serde_json::to_vec(&self.mask(value))
    }

    /// Converts a captured body into its audit value. Never fails.
    ///
    /// Empty bodies produce no value. Structured bodies are parsed and
    /// redacted. Anything else is kept as a trimmed, lossily decoded string.
    pub fn mask_body(&self, bytes: &[u8]) -> Option<Value> {
        match self.parse_and_mask(bytes) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, len = bytes.len(), "body is not structured, capturing as text");
                Some(Value::String(
                    String::from_utf8_lossy(bytes).trim().to_string(),
                ))
            }
        }
    }

    /// Converts a possibly truncated capture into its audit value.
    ///
    /// Untruncated bytes behave exactly like [`mask_body`](Self::mask_body).
    /// A truncated capture that no longer parses is replaced by a marker
    /// naming the captured length: the cut-off text could hold a sensitive
    /// value that redaction can no longer locate.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use trail_core::Redactor;
    ///
    /// let redactor = Redactor::new();
    /// let cut = br#"{"password":"hunter2","no"#;
    ///
    /// assert_eq!(
    ///     redactor.mask_captured(cut, true),
    ///     Some(json!("[truncated body: 25 bytes captured]"))
    /// );
    /// ```
    pub fn mask_captured(&self, bytes: &[u8], truncated: bool) -> Option<Value> {
        if !truncated {
            return self.mask_body(bytes);
        }
        match self.parse_and_mask(bytes) {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!(len = bytes.len(), "truncated body is not structured, recording marker");
                Some(Value::String(format!(
                    "[truncated body: {} bytes captured]",
                    bytes.len()
                )))
            }
        }
    }

    /// Masks header values whose name is a sensitive field.
    ///
    /// The header stays visible; only its value list is replaced.
    pub fn mask_headers(&self, headers: &HeaderMap) -> HeaderMap {
        headers
            .iter()
            .map(|(name, values)| {
                let values = if self.should_mask(name) {
                    vec![self.mask_value.clone()]
                } else {
                    values.clone()
                };
                (name.clone(), values)
            })
            .collect()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}
