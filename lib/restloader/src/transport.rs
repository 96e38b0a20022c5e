//! Built-in transports.
//!
//! - [`HyperTransport`] - hyper-util client with rustls, the default transport
//! - [`ServiceTransport`] - adapts any Tower service stack over [`Descriptor`]s

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower::ServiceExt;
use tower::util::BoxCloneService;
use tower_service::Service;
use tracing::debug;

use crate::{Descriptor, Error, Response, Result, Transport};

// ============================================================================
// Hyper Transport Settings
// ============================================================================

/// Settings of the built-in [`HyperTransport`].
///
/// The client builds its fallback transport from these; see
/// [`ClientBuilder::hyper_config`](crate::ClientBuilder::hyper_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Budget for the whole exchange, from sending to the last body byte.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Maximum idle connections kept per host.
    pub pool_idle_per_host: usize,
    /// How long an idle connection stays in the pool.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl TransportConfig {
    /// HTTPS connector with rustls and the Mozilla roots; plain `http://`
    /// URLs are accepted too.
    fn connector(&self) -> HttpsConnector<HttpConnector> {
        let root_store: rustls::RootCertStore =
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(self.connect_timeout));

        HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http)
    }

    /// Pooled hyper client honoring these settings.
    fn client(&self) -> Client<HttpsConnector<HttpConnector>, Full<Bytes>> {
        Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_idle_per_host)
            .build(self.connector())
    }
}

// ============================================================================
// Hyper Transport
// ============================================================================

/// HTTP transport using hyper-util with connection pooling and TLS.
///
/// The descriptor's method, headers and body are sent as-is; `extra` fields are
/// ignored. Non-2xx statuses are returned as regular responses.
///
/// # Example
///
/// ```ignore
/// use restloader::{Client, HyperTransport, TransportConfig};
/// use std::time::Duration;
///
/// let transport = HyperTransport::with_config(TransportConfig {
///     timeout: Duration::from_secs(5),
///     ..TransportConfig::default()
/// });
/// let client = Client::builder().transport(transport).build();
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: TransportConfig,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransport {
    /// Create a transport with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    /// Create a transport with custom configuration.
    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            inner: config.client(),
            config,
        }
    }

    /// Get the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Build a hyper request from a descriptor.
    fn build_request(descriptor: Descriptor) -> Result<http::Request<Full<Bytes>>> {
        let method = descriptor.method();
        let (url, config) = descriptor.into_parts();
        let url = url::Url::parse(&url)?;

        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str());

        for (name, value) in config.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = config.body().cloned().map_or_else(Full::default, Full::new);
        builder
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    /// Extract response headers as a `HashMap`.
    fn extract_headers(headers: &http::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    async fn execute(&self, descriptor: Descriptor) -> Result<Response> {
        let request = Self::build_request(descriptor)?;

        let exchange = async {
            let response = self
                .inner
                .request(request)
                .await
                .map_err(Self::map_hyper_error)?;

            let status = response.status().as_u16();
            let headers = Self::extract_headers(response.headers());
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::connection(e.to_string()))?
                .to_bytes();

            debug!(status, bytes = body.len(), "response received");
            Ok(Response::new(status, headers, body))
        };

        tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout)?
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::connection(msg);
        }

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

impl Transport for HyperTransport {
    fn call(&self, descriptor: Descriptor) -> BoxFuture<'static, Result<Response>> {
        let transport = self.clone();
        Box::pin(async move { transport.execute(descriptor).await })
    }
}

impl Service<Descriptor> for HyperTransport {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, descriptor: Descriptor) -> Self::Future {
        Transport::call(self, descriptor)
    }
}

// ============================================================================
// Tower Service Transport
// ============================================================================

/// Type-erased Tower service over descriptors.
pub type BoxedService = BoxCloneService<Descriptor, Response, Error>;

/// Transport backed by a Tower service stack.
///
/// Use it to put Tower layers (timeouts, retries, concurrency limits) between
/// the client and the network:
///
/// ```ignore
/// use restloader::{HyperTransport, RetryPolicy, ServiceTransport};
/// use tower::ServiceBuilder;
/// use tower::retry::RetryLayer;
///
/// let transport = ServiceTransport::new(
///     ServiceBuilder::new()
///         .layer(RetryLayer::new(RetryPolicy::new(3)))
///         .concurrency_limit(8)
///         .service(HyperTransport::new()),
/// );
/// ```
#[derive(Clone)]
pub struct ServiceTransport {
    inner: Arc<Mutex<BoxedService>>,
}

impl fmt::Debug for ServiceTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTransport").finish_non_exhaustive()
    }
}

impl ServiceTransport {
    /// Wrap a Tower service.
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Descriptor, Response = Response, Error = Error> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(BoxCloneService::new(service))),
        }
    }
}

impl Transport for ServiceTransport {
    fn call(&self, descriptor: Descriptor) -> BoxFuture<'static, Result<Response>> {
        // Clone under the lock, drive the clone without it
        let service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Box::pin(service.oneshot(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tower::ServiceBuilder;

    use super::*;
    use crate::{Method, RequestConfig};

    #[test]
    fn build_request_copies_descriptor() {
        let descriptor = Descriptor::new(
            "https://api.example.com/users",
            RequestConfig::new()
                .with_method(Method::Put)
                .with_header("X-Trace", "abc")
                .with_body("payload"),
        );

        let request = HyperTransport::build_request(descriptor).expect("request");
        assert_eq!(request.method(), http::Method::PUT);
        assert_eq!(request.uri(), "https://api.example.com/users");
        assert_eq!(request.headers()["x-trace"], "abc");
    }

    #[test]
    fn build_request_rejects_invalid_url() {
        let descriptor = Descriptor::new("not a url", RequestConfig::new());
        let err = HyperTransport::build_request(descriptor).expect_err("invalid url");
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn transport_keeps_its_settings() {
        let transport = HyperTransport::with_config(TransportConfig {
            timeout: Duration::from_secs(3),
            ..TransportConfig::default()
        });
        let debug = format!("{transport:?}");
        assert!(debug.contains("HyperTransport"));
        assert_eq!(transport.config().timeout, Duration::from_secs(3));
        assert_eq!(transport.config().connect_timeout, Duration::from_secs(10));
        assert_eq!(transport.config().pool_idle_per_host, 32);
    }

    #[tokio::test]
    async fn service_transport_runs_tower_stack() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = {
            let calls = Arc::clone(&calls);
            tower::service_fn(move |descriptor: Descriptor| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(Response::ok(descriptor.url().to_string()))
                }
            })
        };

        let transport = ServiceTransport::new(
            ServiceBuilder::new()
                .concurrency_limit(1)
                .service(service),
        );

        let descriptor = Descriptor::new("http://example.org/a", RequestConfig::new());
        let response = transport.call(descriptor).await.expect("response");

        assert_eq!(response.text().expect("utf8"), "http://example.org/a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
