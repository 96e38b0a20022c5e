//! Phase logging middleware.
//!
//! Logs outgoing descriptors, received responses and failures using the
//! `tracing` crate. Register the same [`Logging`] value on every phase you
//! want to observe.

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::{Descriptor, Middleware, Next, Recovery, Response, Result};

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at debug level (headers and sizes included).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

/// Middleware logging each phase it is registered on.
///
/// # Example
///
/// ```ignore
/// use restloader::{Client, Interceptors, middleware::Logging};
///
/// let client = Client::builder()
///     .with(
///         Interceptors::new()
///             .on_request(Logging::debug())
///             .on_response(Logging::debug())
///             .on_error(Logging::debug()),
///     )
///     .build();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging {
    level: LogLevel,
}

impl Logging {
    /// Create a logging middleware with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging middleware that logs at debug level.
    #[must_use]
    pub const fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }

    /// Configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

impl Middleware<Descriptor> for Logging {
    fn handle<'a>(
        &'a self,
        descriptor: Descriptor,
        next: Next<Descriptor>,
    ) -> BoxFuture<'a, Result<Descriptor>> {
        let method = descriptor.method();
        match self.level {
            LogLevel::Debug => {
                debug!(
                    method = %method,
                    url = descriptor.url(),
                    headers = ?descriptor.config().headers(),
                    "sending request"
                );
            }
            LogLevel::Info => {
                info!(method = %method, url = descriptor.url(), "sending request");
            }
        }
        next.run(descriptor)
    }
}

impl Middleware<Response> for Logging {
    fn handle<'a>(
        &'a self,
        response: Response,
        next: Next<Response>,
    ) -> BoxFuture<'a, Result<Response>> {
        let status = response.status();
        if response.is_success() {
            match self.level {
                LogLevel::Debug => debug!(
                    status,
                    headers = ?response.headers(),
                    bytes = response.body().len(),
                    "response received"
                ),
                LogLevel::Info => info!(status, "response received"),
            }
        } else {
            warn!(status, "response with HTTP error status");
        }
        next.run(response)
    }
}

impl Middleware<Recovery> for Logging {
    fn handle<'a>(
        &'a self,
        recovery: Recovery,
        next: Next<Recovery>,
    ) -> BoxFuture<'a, Result<Recovery>> {
        match &recovery {
            Recovery::Failed(error) => warn!(error = %error, "request failed"),
            Recovery::Recovered(response) => {
                info!(status = response.status(), "request already recovered");
            }
        }
        next.run(recovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chain, Error, RequestConfig};

    #[test]
    fn logging_levels() {
        assert_eq!(Logging::new().level(), LogLevel::Info);
        assert_eq!(Logging::debug().level(), LogLevel::Debug);
    }

    #[tokio::test]
    async fn logging_passes_values_through() {
        let requests = Chain::new();
        requests.use_middleware(Logging::debug());
        let descriptor = requests
            .process(Descriptor::new("http://example.org", RequestConfig::new()))
            .await
            .expect("request");
        assert_eq!(descriptor.url(), "http://example.org");

        let responses = Chain::new();
        responses.use_middleware(Logging::new());
        let response = responses
            .process(Response::ok("body").with_status(404))
            .await
            .expect("response");
        assert_eq!(response.status(), 404);

        let errors = Chain::new();
        errors.use_middleware(Logging::new());
        let recovery = errors
            .process(Recovery::Failed(Error::Timeout))
            .await
            .expect("recovery");
        assert!(recovery.error().is_some_and(Error::is_timeout));
    }
}
