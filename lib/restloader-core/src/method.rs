//! Request verbs.
//!
//! Only the verbs the client exposes exist here: `load` and `get` use
//! [`Method::Get`], the other helpers pin their own verb during BUILD.

use derive_more::Display;
use serde::Serialize;

/// Verb of a [`Descriptor`](crate::Descriptor).
///
/// A descriptor without an explicit method is a `GET`. The upper-case wire
/// name is what the cache key and the transport see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`, the only verb served through the load cache.
    #[default]
    #[display("GET")]
    Get,
    /// `POST`.
    #[display("POST")]
    Post,
    /// `PUT`.
    #[display("PUT")]
    Put,
    /// `DELETE`.
    #[display("DELETE")]
    Delete,
}

impl Method {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}
