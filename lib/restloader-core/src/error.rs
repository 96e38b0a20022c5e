//! Failure taxonomy.
//!
//! Every failure of a request funnels into the error-phase chain as one
//! [`Error`], whichever step raised it:
//!
//! - transport failures: [`Error::Connection`], [`Error::Tls`],
//!   [`Error::Timeout`], [`Error::Transport`] and [`Error::Http`] when a
//!   middleware rejects a status;
//! - middleware failures: [`Error::Middleware`];
//! - batch failures: [`Error::Batch`], [`Error::Canceled`];
//! - request building: [`Error::InvalidUrl`], [`Error::InvalidRequest`] and
//!   the JSON variants.

use std::sync::Arc;

use derive_more::{Display, Error, From};

/// A request failure.
///
/// The error is `Clone` so that a single cached failure can be handed to every
/// caller waiting on the same load.
#[derive(Debug, Clone, Display, Error, From)]
pub enum Error {
    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------
    /// The request completed with a status a handler refused.
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Reason phrase or handler message.
        message: String,
        /// Response body, if kept.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// The connection could not be established or broke mid-exchange.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS handshake or certificate failure.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// The transport gave up waiting.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Failure reported by a custom transport.
    #[display("transport error: {_0}")]
    #[from(skip)]
    Transport(#[error(not(source))] String),

    // ------------------------------------------------------------------------
    // Middleware
    // ------------------------------------------------------------------------
    /// Failure raised by a request, response or error handler.
    #[display("middleware error: {_0}")]
    #[from(skip)]
    Middleware(#[error(not(source))] String),

    // ------------------------------------------------------------------------
    // Batch
    // ------------------------------------------------------------------------
    /// The batch function produced no result for this descriptor.
    #[display("batch error: {_0}")]
    #[from(skip)]
    Batch(#[error(not(source))] String),

    /// The task settling a load went away before producing a result.
    #[display("request canceled before completion")]
    #[from(skip)]
    Canceled,

    // ------------------------------------------------------------------------
    // Request building
    // ------------------------------------------------------------------------
    /// The descriptor cannot be turned into a request.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// The descriptor URL does not parse.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// A body or a cache key could not be serialized.
    #[display("JSON serialization error: {_0}")]
    #[from(skip)]
    JsonSerialization(Arc<serde_json::Error>),

    /// A body could not be decoded; `path` points at the offending field.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the field (e.g. `response_body.items[2].id`).
        path: String,
        /// Decoder message.
        message: String,
    },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonSerialization(Arc::new(err))
    }
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status failure without a body.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// HTTP status failure keeping the response body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: bytes::Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Connection failure.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// TLS failure.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Custom transport failure.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Handler failure.
    #[must_use]
    pub fn middleware(message: impl Into<String>) -> Self {
        Self::Middleware(message.into())
    }

    /// Batch settlement failure.
    #[must_use]
    pub fn batch(message: impl Into<String>) -> Self {
        Self::Batch(message.into())
    }

    /// Descriptor that cannot become a request.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Body decoding failure at `path`.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for [`Error::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` for [`Error::Connection`].
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the transport raised this error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Tls(_) | Self::Timeout | Self::Transport(_)
        )
    }

    /// Returns `true` if a middleware handler raised this error.
    #[must_use]
    pub const fn is_middleware(&self) -> bool {
        matches!(self, Self::Middleware(_))
    }

    /// Returns `true` if the load cache could not settle the request.
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_) | Self::Canceled)
    }

    /// Status of an [`Error::Http`].
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Body kept by an [`Error::Http`].
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Decode the body kept by an [`Error::Http`] as JSON.
    ///
    /// Returns `None` if there is no body.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| decode_json(body))
    }
}

/// Decode JSON, reporting the path of the field that failed.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|e| Error::json_deserialization(e.path().to_string(), e.inner().to_string()))
}

#[cfg(test)]
mod tests {
    use assert2::let_assert;

    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(Error::http(404, "Not Found").to_string(), "HTTP error 404: Not Found");
        assert_eq!(Error::Timeout.to_string(), "request timeout");
        assert_eq!(
            Error::middleware("missing token").to_string(),
            "middleware error: missing token"
        );
    }

    #[test]
    fn error_taxonomy() {
        assert!(Error::Timeout.is_transport());
        assert!(Error::connection("refused").is_transport());
        assert!(Error::transport("boom").is_transport());
        assert!(!Error::middleware("boom").is_transport());
        assert!(Error::middleware("boom").is_middleware());
        assert!(Error::batch("short").is_batch());
        assert!(Error::Canceled.is_batch());
        assert!(!Error::Timeout.is_batch());
        assert_eq!(Error::http(503, "Service Unavailable").status(), Some(503));
        assert_eq!(Error::Timeout.status(), None);
    }

    #[test]
    fn cached_serialization_failure_is_shareable() {
        let json_err = serde_json::from_str::<u32>("nope").expect_err("invalid json");
        let err = Error::from(json_err);
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn decode_json_reports_field_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Envelope {
            #[allow(dead_code)]
            response_body: Vec<u32>,
        }

        let err = decode_json::<Envelope>(br#"{"response_body":[1,"two"]}"#)
            .expect_err("should fail");
        let_assert!(Error::JsonDeserialization { path, .. } = err);
        assert_eq!(path, "response_body[1]");
    }

    #[test]
    fn decode_body_of_http_error() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct ApiError {
            error: String,
        }

        let err = Error::http_with_body(404, "Not Found", r#"{"error":"gone"}"#.into());
        let decoded = err
            .decode_body::<ApiError>()
            .expect("should have body")
            .expect("should decode");
        assert_eq!(decoded.error, "gone");

        assert!(Error::Timeout.decode_body::<ApiError>().is_none());
    }
}
