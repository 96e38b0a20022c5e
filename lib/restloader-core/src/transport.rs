//! Transport contract.
//!
//! A [`Transport`] performs the actual network call for a [`Descriptor`]. The
//! core never looks inside a transport; it only awaits the response or the
//! failure. Async closures become transports through [`transport_fn`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::{Descriptor, Response, Result};

/// Pluggable function performing the network call for a descriptor.
pub trait Transport: Send + Sync + 'static {
    /// Send the request described by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be completed:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    fn call(&self, descriptor: Descriptor) -> BoxFuture<'static, Result<Response>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(&self, descriptor: Descriptor) -> BoxFuture<'static, Result<Response>> {
        (**self).call(descriptor)
    }
}

/// Transport built from an async closure, see [`transport_fn`].
#[derive(Clone, Copy)]
pub struct TransportFn<F> {
    f: F,
}

impl<F> fmt::Debug for TransportFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFn").finish_non_exhaustive()
    }
}

/// Turns an async closure `descriptor -> Result<Response>` into a [`Transport`].
///
/// # Example
///
/// ```
/// use restloader_core::{Descriptor, Response, transport_fn};
///
/// let transport = transport_fn(|descriptor: Descriptor| async move {
///     Ok(Response::ok(descriptor.url().to_string()))
/// });
/// ```
pub fn transport_fn<F, Fut>(f: F) -> TransportFn<F>
where
    F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    TransportFn { f }
}

impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn call(&self, descriptor: Descriptor) -> BoxFuture<'static, Result<Response>> {
        Box::pin((self.f)(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, RequestConfig};

    #[tokio::test]
    async fn closure_transport_receives_descriptor() {
        let transport = transport_fn(|descriptor: Descriptor| async move {
            Ok(Response::ok(format!(
                "{} {}",
                descriptor.method(),
                descriptor.url()
            )))
        });

        let response = transport
            .call(Descriptor::new("http://example.org", RequestConfig::new()))
            .await
            .expect("response");
        assert_eq!(response.text().expect("utf8"), "GET http://example.org");
    }

    #[tokio::test]
    async fn shared_transport_delegates() {
        let transport: Arc<dyn Transport> =
            Arc::new(transport_fn(|_: Descriptor| async { Err(Error::Timeout) }));

        let result = transport
            .call(Descriptor::new("http://example.org", RequestConfig::new()))
            .await;
        assert!(result.is_err_and(|err| err.is_timeout()));
    }
}
