//! Retry policy for Tower-based transports.
//!
//! The client never retries on its own. Retries belong to the transport and
//! are expressed as a [`RetryLayer`](tower::retry::RetryLayer) around a
//! [`ServiceTransport`](crate::ServiceTransport).

use std::future;

use tower::retry::Policy;

use crate::{Descriptor, Error, Response};

/// A simple retry policy for descriptors.
///
/// By default, retries:
/// - Connection errors and timeouts
/// - 5xx server errors
/// - 429 Too Many Requests
///
/// # Example
///
/// ```ignore
/// use restloader::{HyperTransport, RetryPolicy, ServiceTransport};
/// use tower::ServiceBuilder;
/// use tower::retry::RetryLayer;
///
/// let transport = ServiceTransport::new(
///     ServiceBuilder::new()
///         .layer(RetryLayer::new(RetryPolicy::new(3)))
///         .service(HyperTransport::new()),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    remaining: u32,
}

impl RetryPolicy {
    /// Create a new retry policy with the given maximum number of retries.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            remaining: max_retries,
        }
    }

    fn should_retry_response(response: &Response) -> bool {
        let status = response.status();
        status >= 500 || status == 429
    }

    fn should_retry_error(error: &Error) -> bool {
        error.is_connection() || error.is_timeout()
    }
}

impl Policy<Descriptor, Response, Error> for RetryPolicy {
    type Future = future::Ready<()>;

    fn retry(
        &mut self,
        _descriptor: &mut Descriptor,
        result: &mut Result<Response, Error>,
    ) -> Option<Self::Future> {
        if self.remaining == 0 {
            return None;
        }

        let should_retry = match result {
            Ok(response) => Self::should_retry_response(response),
            Err(error) => Self::should_retry_error(error),
        };

        if should_retry {
            self.remaining -= 1;
            tracing::debug!(remaining = self.remaining, "retrying request");
            Some(future::ready(()))
        } else {
            None
        }
    }

    fn clone_request(&mut self, descriptor: &Descriptor) -> Option<Descriptor> {
        Some(descriptor.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tower::ServiceBuilder;
    use tower::retry::RetryLayer;

    use super::*;
    use crate::{RequestConfig, ServiceTransport, Transport};

    #[test]
    fn retries_server_errors_and_throttling() {
        assert!(RetryPolicy::should_retry_response(&Response::ok("").with_status(503)));
        assert!(RetryPolicy::should_retry_response(&Response::ok("").with_status(429)));
        assert!(!RetryPolicy::should_retry_response(&Response::ok("").with_status(404)));
        assert!(!RetryPolicy::should_retry_response(&Response::ok("")));
    }

    #[test]
    fn retries_connection_and_timeout_errors() {
        assert!(RetryPolicy::should_retry_error(&Error::connection("refused")));
        assert!(RetryPolicy::should_retry_error(&Error::Timeout));
        assert!(!RetryPolicy::should_retry_error(&Error::middleware("rejected")));
    }

    #[tokio::test]
    async fn service_transport_retries_until_budget_is_spent() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let service = {
            let attempts = Arc::clone(&attempts);
            tower::service_fn(move |_: Descriptor| {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(Response::ok("busy").with_status(503))
                }
            })
        };

        let transport = ServiceTransport::new(
            ServiceBuilder::new()
                .layer(RetryLayer::new(RetryPolicy::new(2)))
                .service(service),
        );

        let response = transport
            .call(Descriptor::new("http://example.org", RequestConfig::new()))
            .await
            .expect("response");

        assert_eq!(response.status(), 503);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
