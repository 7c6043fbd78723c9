//! Allow/deny projection over multi-valued header maps.

use std::collections::{BTreeMap, HashSet};

use crate::redact::DEFAULT_MASK_VALUE;

/// Multi-valued header map, ordered by header name.
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// Header names masked by default (matched case-insensitively).
pub const DEFAULT_EXCLUDED_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

/// Groups flat `(name, value)` pairs into a [`HeaderMap`].
///
/// Repeated names accumulate their values in arrival order.
///
/// # Examples
///
/// ```
/// use trail_core::collect_headers;
///
/// let headers = collect_headers([("Accept", "text/html"), ("Accept", "application/json")]);
/// assert_eq!(headers["Accept"], vec!["text/html", "application/json"]);
/// ```
pub fn collect_headers<I, K, V>(pairs: I) -> HeaderMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.entry(name.into()).or_default().push(value.into());
    }
    headers
}

/// Two-stage header filter.
///
/// 1. Allow-list: when configured, only listed headers pass at all.
/// 2. Deny-list: listed headers pass, but their values are replaced by the
///    mask literal so the header name stays visible.
///
/// Names are compared case-insensitively. Output value lists are always
/// fresh copies of the input.
///
/// # Examples
///
/// ```
/// use trail_core::{collect_headers, HeaderFilter};
///
/// let filter = HeaderFilter::new();
/// let headers = collect_headers([("Authorization", "Bearer abc"), ("X-Test", "ok")]);
/// let filtered = filter.filter(&headers);
///
/// assert_eq!(filtered["Authorization"], vec!["***MASKED***"]);
/// assert_eq!(filtered["X-Test"], vec!["ok"]);
/// ```
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    exclude: HashSet<String>,
    include: Option<HashSet<String>>,
    mask_value: String,
}

impl HeaderFilter {
    /// Creates a filter with the default deny-list and no allow-list.
    pub fn new() -> Self {
        Self {
            exclude: DEFAULT_EXCLUDED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            include: None,
            mask_value: DEFAULT_MASK_VALUE.to_string(),
        }
    }

    /// Replaces the deny-list.
    pub fn with_exclude<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude = lowercase_set(headers);
        self
    }

    /// Sets an allow-list. Only listed headers will pass.
    pub fn with_include<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include = Some(lowercase_set(headers));
        self
    }

    /// Sets the literal used for denied header values.
    pub fn with_mask_value(mut self, value: impl Into<String>) -> Self {
        self.mask_value = value.into();
        self
    }

    /// Returns `true` if the header's values would be masked.
    pub fn should_exclude(&self, name: &str) -> bool {
        self.exclude.contains(&name.to_lowercase())
    }

    /// Returns `true` if the header passes the allow-list.
    pub fn should_include(&self, name: &str) -> bool {
        match &self.include {
            Some(include) => include.contains(&name.to_lowercase()),
            None => true,
        }
    }

    /// Adds a header to the deny-list.
    pub fn add_exclude_header(&mut self, name: &str) {
        self.exclude.insert(name.to_lowercase());
    }

    /// Removes a header from the deny-list.
    pub fn remove_exclude_header(&mut self, name: &str) {
        self.exclude.remove(&name.to_lowercase());
    }

    /// Applies the allow-list then the deny-list.
    pub fn filter(&self, headers: &HeaderMap) -> HeaderMap {
        headers
            .iter()
            .filter(|(name, _)| self.should_include(name))
            .map(|(name, values)| {
                let values = if self.should_exclude(name) {
                    vec![self.mask_value.clone()]
                } else {
                    values.clone()
                };
                (name.clone(), values)
            })
            .collect()
    }
}

impl Default for HeaderFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn lowercase_set<I, S>(names: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().to_lowercase())
        .collect()
}
