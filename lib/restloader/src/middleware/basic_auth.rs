//! Basic authentication middleware.
//!
//! Adds an `authorization: Basic <base64(user:pass)>` header to every
//! outgoing request.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use futures_util::future::BoxFuture;

use crate::{Descriptor, Middleware, Next, Result};

/// Request-phase middleware that adds basic authentication.
///
/// # Example
///
/// ```ignore
/// use restloader::{Client, Interceptors, middleware::BasicAuth};
///
/// let client = Client::builder()
///     .with(Interceptors::new().on_request(BasicAuth::new("username", "password")))
///     .build();
/// ```
#[derive(Clone)]
pub struct BasicAuth {
    /// Base64-encoded "username:password".
    encoded_credentials: Arc<str>,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("credentials", &"***")
            .finish()
    }
}

impl BasicAuth {
    /// Create a new basic auth middleware with the given username and password.
    pub fn new(username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let credentials = format!("{}:{}", username.as_ref(), password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        Self {
            encoded_credentials: Arc::from(encoded),
        }
    }
}

impl Middleware<Descriptor> for BasicAuth {
    fn handle<'a>(
        &'a self,
        descriptor: Descriptor,
        next: Next<Descriptor>,
    ) -> BoxFuture<'a, Result<Descriptor>> {
        next.run(descriptor.with_header(
            "authorization",
            format!("Basic {}", self.encoded_credentials),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chain, RequestConfig};

    #[test]
    fn basic_auth_encodes_correctly() {
        // "user:pass" -> "dXNlcjpwYXNz"
        let auth = BasicAuth::new("user", "pass");
        assert_eq!(&*auth.encoded_credentials, "dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn basic_auth_sets_header() {
        let chain = Chain::new();
        chain.use_middleware(BasicAuth::new("user", "pass"));

        let descriptor = chain
            .process(Descriptor::new("http://example.org", RequestConfig::new()))
            .await
            .expect("process");

        assert_eq!(
            descriptor.config().header("authorization"),
            Some("Basic dXNlcjpwYXNz")
        );
    }
}
