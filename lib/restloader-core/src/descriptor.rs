//! Request descriptors.
//!
//! A [`Descriptor`] is the `{url, config}` pair identifying a request before it
//! reaches a transport. Descriptors are plain values: middleware receives one by
//! value and forwards a (possibly different) one, nothing is shared.
//!
//! # Example
//!
//! ```
//! use restloader_core::{Descriptor, Method, RequestConfig};
//!
//! let config = RequestConfig::new()
//!     .with_method(Method::Get)
//!     .with_header("Accept", "application/json");
//! let descriptor = Descriptor::new("https://api.example.com/users", config);
//!
//! assert_eq!(descriptor.method(), Method::Get);
//! assert_eq!(descriptor.config().header("accept"), Some("application/json"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Method, Result, Transport};

pub(crate) const APPLICATION_JSON: &str = "application/json";
const TEXT_PLAIN: &str = "text/plain";

// ============================================================================
// Request Configuration
// ============================================================================

/// Per-request configuration: method, headers, body and transport-specific fields.
///
/// Header names are stored lower-cased, so `Accept` and `accept` name the same
/// header both when merging and when deriving cache keys.
#[derive(Clone, Default, Serialize)]
pub struct RequestConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<Method>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Bytes>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    extra: Map<String, Value>,
    #[serde(skip)]
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("extra", &self.extra)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl RequestConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets multiple headers.
    #[must_use]
    pub fn with_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self = self.with_header(name, value);
        }
        self
    }

    /// Sets the raw request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a plain-text body.
    #[must_use]
    pub fn text(self, body: impl Into<String>) -> Self {
        self.with_header("content-type", TEXT_PLAIN)
            .with_body(body.into())
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self
            .with_header("content-type", APPLICATION_JSON)
            .with_body(body))
    }

    /// Sets a transport-specific field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Overrides the transport used for this request.
    #[must_use]
    pub fn with_transport(self, transport: impl Transport) -> Self {
        self.with_shared_transport(Arc::new(transport))
    }

    /// Overrides the transport used for this request with a shared instance.
    #[must_use]
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// HTTP method, if set.
    #[must_use]
    pub const fn method(&self) -> Option<Method> {
        self.method
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Mutable access to headers.
    pub fn headers_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.headers
    }

    /// Single header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Transport-specific fields.
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Mutable access to transport-specific fields.
    pub fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }

    /// Per-request transport override, if any.
    #[must_use]
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// Layers `overrides` on top of `self`.
    ///
    /// Scalar fields set in `overrides` replace those of `self`; headers are
    /// merged by name and `extra` JSON objects are merged recursively.
    ///
    /// ```
    /// use restloader_core::{Method, RequestConfig};
    ///
    /// let defaults = RequestConfig::new()
    ///     .with_header("accept", "application/json")
    ///     .with_header("x-client", "restloader");
    /// let call = RequestConfig::new()
    ///     .with_method(Method::Post)
    ///     .with_header("x-client", "custom");
    ///
    /// let merged = defaults.merge(call);
    /// assert_eq!(merged.method(), Some(Method::Post));
    /// assert_eq!(merged.header("accept"), Some("application/json"));
    /// assert_eq!(merged.header("x-client"), Some("custom"));
    /// ```
    #[must_use]
    pub fn merge(mut self, overrides: Self) -> Self {
        let Self {
            method,
            headers,
            body,
            extra,
            transport,
        } = overrides;

        self.method = method.or(self.method);
        self.headers.extend(headers);
        self.body = body.or(self.body);
        merge_objects(&mut self.extra, extra);
        self.transport = transport.or(self.transport);
        self
    }
}

fn merge_objects(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(slot) => merge_values(slot, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_objects(base, overlay),
        (slot, overlay) => *slot = overlay,
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// The `{url, config}` pair identifying a request.
#[derive(Debug, Clone, Serialize)]
pub struct Descriptor {
    url: String,
    config: RequestConfig,
}

impl Descriptor {
    /// Creates a new descriptor.
    #[must_use]
    pub fn new(url: impl Into<String>, config: RequestConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request configuration.
    #[must_use]
    pub const fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Effective method, `GET` when none was set.
    #[must_use]
    pub fn method(&self) -> Method {
        self.config.method.unwrap_or_default()
    }

    /// Replaces the URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = config;
        self
    }

    /// Transforms the configuration.
    #[must_use]
    pub fn map_config(mut self, f: impl FnOnce(RequestConfig) -> RequestConfig) -> Self {
        self.config = f(self.config);
        self
    }

    /// Sets a header on the configuration.
    #[must_use]
    pub fn with_header(self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.map_config(|config| config.with_header(name, value))
    }

    /// Consume into (url, config).
    #[must_use]
    pub fn into_parts(self) -> (String, RequestConfig) {
        (self.url, self.config)
    }

    /// Canonical cache key for this descriptor.
    ///
    /// The key is the JSON serialization of `{url, config}` with every object's
    /// keys sorted, so logically identical descriptors always produce the same
    /// key regardless of the order fields were set in. The transport override
    /// is not part of the key.
    pub fn cache_key(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&canonicalize(value)).map_err(Into::into)
    }
}

/// Sort every object's keys.
///
/// `Map` is already sorted unless some crate in the graph enables serde_json's
/// `preserve_order` feature, which turns it into an insertion-ordered map and
/// would make keys depend on the order `extra` fields were set in.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn descriptor(config: RequestConfig) -> Descriptor {
        Descriptor::new("http://example.org/api/v1/test", config)
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let config = RequestConfig::new().with_header("Authorization", "Bearer broken");
        assert_eq!(config.header("authorization"), Some("Bearer broken"));
        assert_eq!(config.header("AUTHORIZATION"), Some("Bearer broken"));
    }

    #[test]
    fn merge_prefers_overrides() {
        let defaults = RequestConfig::new()
            .with_method(Method::Get)
            .with_body("default")
            .with_extra("credentials", "include");
        let merged = defaults.merge(RequestConfig::new().with_method(Method::Put));

        assert_eq!(merged.method(), Some(Method::Put));
        assert_eq!(merged.body(), Some(&Bytes::from("default")));
        assert_eq!(merged.extra()["credentials"], "include");
    }

    #[test]
    fn merge_extra_is_recursive() {
        let defaults = RequestConfig::new().with_extra("cache", json!({"mode": "default", "ttl": 10}));
        let call = RequestConfig::new().with_extra("cache", json!({"mode": "no-store"}));

        let merged = defaults.merge(call);
        assert_eq!(merged.extra()["cache"], json!({"mode": "no-store", "ttl": 10}));
    }

    #[test]
    fn cache_key_is_stable_across_insertion_order() {
        let first = RequestConfig::new()
            .with_header("b", "2")
            .with_header("a", "1")
            .with_extra("z", json!({"y": 1, "x": 2}))
            .with_extra("m", true);
        let second = RequestConfig::new()
            .with_extra("m", true)
            .with_extra("z", json!({"x": 2, "y": 1}))
            .with_header("a", "1")
            .with_header("b", "2");

        assert_eq!(
            descriptor(first).cache_key().expect("key"),
            descriptor(second).cache_key().expect("key")
        );
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let value = canonicalize(json!({"b": [{"y": 1, "x": 2}], "a": {"d": 1, "c": 2}}));
        assert_eq!(
            serde_json::to_string(&value).expect("serialize"),
            r#"{"a":{"c":2,"d":1},"b":[{"x":2,"y":1}]}"#
        );
    }

    #[test]
    fn cache_key_is_sensitive_to_every_field() {
        let base = descriptor(RequestConfig::new().with_header("authorization", "Bearer a"));
        let header = descriptor(RequestConfig::new().with_header("authorization", "Bearer b"));
        let url = base.clone().with_url("http://example.org/api/v1/other");
        let method = base
            .clone()
            .map_config(|config| config.with_method(Method::Post));
        let nested = base
            .clone()
            .map_config(|config| config.with_extra("cache", json!({"mode": "reload"})));

        let key = base.cache_key().expect("key");
        for other in [header, url, method, nested] {
            assert_ne!(key, other.cache_key().expect("key"));
        }
    }

    #[test]
    fn cache_key_shape() {
        let key = descriptor(RequestConfig::new().with_method(Method::Get))
            .cache_key()
            .expect("key");
        assert_eq!(
            key,
            r#"{"config":{"method":"GET"},"url":"http://example.org/api/v1/test"}"#
        );
    }

    #[test]
    fn descriptor_method_defaults_to_get() {
        assert_eq!(descriptor(RequestConfig::new()).method(), Method::Get);
    }
}
