//! Bearer token authentication middleware.
//!
//! Adds an `authorization: Bearer <token>` header to every outgoing request,
//! replacing any value set by the defaults or the call site.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::{Descriptor, Middleware, Next, Result};

/// Request-phase middleware that adds bearer token authentication.
///
/// # Example
///
/// ```ignore
/// use restloader::{Client, Interceptors, middleware::BearerAuth};
///
/// let client = Client::builder()
///     .with(Interceptors::new().on_request(BearerAuth::new("my-secret-token")))
///     .build();
/// ```
#[derive(Clone)]
pub struct BearerAuth {
    token: Arc<str>,
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("token", &"***")
            .finish()
    }
}

impl BearerAuth {
    /// Create a new bearer auth middleware with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl Middleware<Descriptor> for BearerAuth {
    fn handle<'a>(
        &'a self,
        descriptor: Descriptor,
        next: Next<Descriptor>,
    ) -> BoxFuture<'a, Result<Descriptor>> {
        next.run(descriptor.with_header("authorization", format!("Bearer {}", self.token)))
    }
}
