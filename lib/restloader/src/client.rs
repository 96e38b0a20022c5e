//! Request orchestration.
//!
//! A [`Client`] drives every request through the same state machine:
//!
//! ```text
//! BUILD → REQUEST chain → TRANSPORT → RESPONSE chain → done
//!   └──────────┴──────────────┴────────────┴──→ ERROR chain → recovered | failed
//! ```
//!
//! The verb helpers ([`Client::get`], [`Client::post`], ...) always run the
//! state machine. [`Client::load`] goes through the client's [`Loader`], whose
//! batch function is the same state machine pinned to `GET`, so identical loads
//! reach the middleware and the transport once.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tracing::{Instrument, Level, debug, span};

use crate::{
    BatchFn, Chain, Descriptor, Error, HyperTransport, Loader, Method, Middleware, RequestConfig,
    Response, Result, Transport, TransportConfig,
};

// ============================================================================
// Error Phase Value
// ============================================================================

/// Value flowing through the error-phase chain.
///
/// The chain starts with [`Recovery::Failed`] holding the error that aborted
/// the request. A handler recovers by producing [`Recovery::Recovered`]; if the
/// chain ends with `Failed`, the caller receives that error, which is the
/// original one unless a handler replaced it.
///
/// Only `Recovered` resolves the call. Swapping in a different error through
/// `Failed` still fails it, with the new error: recovery always takes a
/// [`Response`], never an arbitrary value.
#[derive(Debug, Clone)]
pub enum Recovery {
    /// The request failed with this error.
    Failed(Error),
    /// A handler produced a response in place of the failure.
    Recovered(Response),
}

impl Recovery {
    /// The error, if not recovered.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Recovered(_) => None,
        }
    }

    /// The replacement response, if recovered.
    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::Failed(_) => None,
            Self::Recovered(response) => Some(response),
        }
    }

    /// Returns `true` if a handler recovered from the failure.
    #[must_use]
    pub const fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered(_))
    }

    /// Convert into the caller-facing result.
    pub fn into_result(self) -> Result<Response> {
        match self {
            Self::Failed(error) => Err(error),
            Self::Recovered(response) => Ok(response),
        }
    }
}

impl From<Error> for Recovery {
    fn from(error: Error) -> Self {
        Self::Failed(error)
    }
}

impl From<Response> for Recovery {
    fn from(response: Response) -> Self {
        Self::Recovered(response)
    }
}

// ============================================================================
// Interceptors
// ============================================================================

/// One optional handler per phase, registered together with
/// [`Client::use_middleware`].
///
/// # Example
///
/// ```ignore
/// use restloader::{Descriptor, Interceptors, Next, Recovery, Response, middleware_fn};
///
/// client.use_middleware(
///     Interceptors::new()
///         .on_request(middleware_fn(|descriptor: Descriptor, next: Next<Descriptor>| {
///             next.run(descriptor.with_header("authorization", "Bearer blubb"))
///         }))
///         .on_error(middleware_fn(|_: Recovery, _: Next<Recovery>| async move {
///             Ok(Recovery::Recovered(Response::ok("fallback")))
///         })),
/// );
/// ```
#[derive(Clone, Default)]
pub struct Interceptors {
    request: Option<Arc<dyn Middleware<Descriptor>>>,
    response: Option<Arc<dyn Middleware<Response>>>,
    error: Option<Arc<dyn Middleware<Recovery>>>,
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("on_request", &self.request.is_some())
            .field("on_response", &self.response.is_some())
            .field("on_error", &self.error.is_some())
            .finish()
    }
}

impl Interceptors {
    /// Creates an empty set of interceptors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for the request phase.
    #[must_use]
    pub fn on_request(mut self, middleware: impl Middleware<Descriptor>) -> Self {
        self.request = Some(Arc::new(middleware));
        self
    }

    /// Handler for the response phase.
    #[must_use]
    pub fn on_response(mut self, middleware: impl Middleware<Response>) -> Self {
        self.response = Some(Arc::new(middleware));
        self
    }

    /// Handler for the error phase.
    #[must_use]
    pub fn on_error(mut self, middleware: impl Middleware<Recovery>) -> Self {
        self.error = Some(Arc::new(middleware));
        self
    }
}

// ============================================================================
// Pipeline (the per-request state machine)
// ============================================================================

struct Pipeline {
    request: Chain<Descriptor>,
    response: Chain<Response>,
    error: Chain<Recovery>,
    defaults: RequestConfig,
    transport: Option<Arc<dyn Transport>>,
    default_transport: Option<Arc<dyn Transport>>,
    hyper_config: TransportConfig,
    hyper: OnceLock<Arc<dyn Transport>>,
}

impl Pipeline {
    fn register(&self, interceptors: Interceptors) {
        let Interceptors {
            request,
            response,
            error,
        } = interceptors;

        if let Some(handler) = request {
            self.request.use_shared(handler);
        }
        if let Some(handler) = response {
            self.response.use_shared(handler);
        }
        if let Some(handler) = error {
            self.error.use_shared(handler);
        }
    }

    /// BUILD: call-site config over instance defaults, then the verb's method.
    fn build(&self, method: Method, url: String, config: RequestConfig) -> Descriptor {
        let config = self.defaults.clone().merge(config).with_method(method);
        Descriptor::new(url, config)
    }

    /// Per-request override, then instance transport, then the injected
    /// default, then a lazily built hyper transport.
    fn transport_for(&self, descriptor: &Descriptor) -> Arc<dyn Transport> {
        if let Some(transport) = descriptor
            .config()
            .transport()
            .or(self.transport.as_ref())
            .or(self.default_transport.as_ref())
        {
            return Arc::clone(transport);
        }

        let hyper = self.hyper.get_or_init(|| {
            debug!("building default hyper transport");
            let transport: Arc<dyn Transport> =
                Arc::new(HyperTransport::with_config(self.hyper_config.clone()));
            transport
        });
        Arc::clone(hyper)
    }

    async fn run(&self, descriptor: Descriptor) -> Result<Response> {
        let descriptor = self.request.process(descriptor).await?;
        let transport = self.transport_for(&descriptor);
        let response = transport.call(descriptor).await?;
        self.response.process(response).await
    }

    async fn recover(&self, error: Error) -> Result<Response> {
        if self.error.is_empty() {
            return Err(error);
        }

        debug!(%error, "running error middleware");
        let recovery = self.error.process(Recovery::Failed(error)).await?;
        if recovery.is_recovered() {
            debug!("request recovered by error middleware");
        }
        recovery.into_result()
    }

    async fn execute(&self, descriptor: Descriptor) -> Result<Response> {
        let method = descriptor.method();
        let span = span!(Level::DEBUG, "request", %method, url = descriptor.url());

        async move {
            let start = Instant::now();
            let outcome = match self.run(descriptor).await {
                Ok(response) => Ok(response),
                Err(error) => self.recover(error).await,
            };

            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &outcome {
                Ok(response) => debug!(status = response.status(), elapsed_ms, "request completed"),
                Err(error) => debug!(%error, elapsed_ms, "request failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Batch function running each descriptor of a window through the pipeline.
struct PipelineBatch(Arc<Pipeline>);

impl BatchFn for PipelineBatch {
    fn dispatch(&self, batch: Vec<Descriptor>) -> Vec<BoxFuture<'static, Result<Response>>> {
        batch
            .into_iter()
            .map(|descriptor| {
                let pipeline = Arc::clone(&self.0);
                let fetch: BoxFuture<'static, Result<Response>> =
                    Box::pin(async move { pipeline.execute(descriptor).await });
                fetch
            })
            .collect()
    }
}

// ============================================================================
// Public Client
// ============================================================================

/// Request orchestrator with request/response/error middleware phases and a
/// deduplicating request cache.
///
/// Cloning a `Client` yields another handle on the same chains and cache.
///
/// # Example
///
/// ```ignore
/// use restloader::{Client, RequestConfig};
///
/// let client = Client::builder()
///     .header("accept", "application/json")
///     .build();
///
/// // Always hits the transport
/// let created = client.post("https://api.example.com/users", RequestConfig::new().json(&user)?).await?;
///
/// // Deduplicated and cached
/// let (a, b) = tokio::join!(
///     client.load("https://api.example.com/users/1", RequestConfig::new()),
///     client.load("https://api.example.com/users/1", RequestConfig::new()),
/// );
/// ```
#[derive(Clone)]
pub struct Client {
    pipeline: Arc<Pipeline>,
    loader: Loader<PipelineBatch>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("defaults", &self.pipeline.defaults)
            .field("request", &self.pipeline.request)
            .field("response", &self.pipeline.response)
            .field("error", &self.pipeline.error)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client with no defaults, using the hyper transport.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Register one handler into each phase named by `interceptors`.
    pub fn use_middleware(&self, interceptors: Interceptors) -> &Self {
        self.pipeline.register(interceptors);
        self
    }

    /// Request-phase chain.
    #[must_use]
    pub fn request_chain(&self) -> &Chain<Descriptor> {
        &self.pipeline.request
    }

    /// Response-phase chain.
    #[must_use]
    pub fn response_chain(&self) -> &Chain<Response> {
        &self.pipeline.response
    }

    /// Error-phase chain.
    #[must_use]
    pub fn error_chain(&self) -> &Chain<Recovery> {
        &self.pipeline.error
    }

    /// Instance default configuration.
    #[must_use]
    pub fn defaults(&self) -> &RequestConfig {
        &self.pipeline.defaults
    }

    /// Run a request with an explicit method, bypassing the cache.
    pub async fn request(
        &self,
        method: Method,
        url: impl Into<String>,
        config: RequestConfig,
    ) -> Result<Response> {
        let descriptor = self.pipeline.build(method, url.into(), config);
        self.pipeline.execute(descriptor).await
    }

    /// `GET` request, bypassing the cache.
    pub async fn get(&self, url: impl Into<String>, config: RequestConfig) -> Result<Response> {
        self.request(Method::Get, url, config).await
    }

    /// `POST` request.
    pub async fn post(&self, url: impl Into<String>, config: RequestConfig) -> Result<Response> {
        self.request(Method::Post, url, config).await
    }

    /// `PUT` request.
    pub async fn put(&self, url: impl Into<String>, config: RequestConfig) -> Result<Response> {
        self.request(Method::Put, url, config).await
    }

    /// `DELETE` request.
    pub async fn delete(&self, url: impl Into<String>, config: RequestConfig) -> Result<Response> {
        self.request(Method::Delete, url, config).await
    }

    /// Cached, deduplicated `GET`.
    ///
    /// Identical loads (same URL and merged config) share a single run of the
    /// middleware and the transport for the lifetime of the client, until
    /// [`Client::invalidate`] or [`Client::clear_cache`] is called. Loads issued
    /// before any of them is awaited are dispatched as one batch.
    ///
    /// # Panics
    ///
    /// The returned future panics if polled outside of a Tokio runtime.
    pub fn load(
        &self,
        url: impl Into<String>,
        config: RequestConfig,
    ) -> BoxFuture<'static, Result<Response>> {
        let descriptor = self.pipeline.build(Method::Get, url.into(), config);
        self.loader.load(descriptor)
    }

    /// Drop the cached result of `load(url, config)`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn invalidate(&self, url: impl Into<String>, config: RequestConfig) -> bool {
        let descriptor = self.pipeline.build(Method::Get, url.into(), config);
        self.loader.invalidate(&descriptor)
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.loader.clear();
    }

    /// Number of cached (or in-flight) loads.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.loader.len()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Client`].
///
/// # Example
///
/// ```ignore
/// use restloader::{Client, Interceptors, middleware::BearerAuth};
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .header("accept", "application/json")
///     .timeout(Duration::from_secs(10))
///     .with(Interceptors::new().on_request(BearerAuth::new("my-token")))
///     .build();
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    defaults: RequestConfig,
    transport: Option<Arc<dyn Transport>>,
    default_transport: Option<Arc<dyn Transport>>,
    hyper_config: TransportConfig,
    interceptors: Vec<Interceptors>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("defaults", &self.defaults)
            .field("transport", &self.transport.is_some())
            .field("default_transport", &self.default_transport.is_some())
            .field("hyper_config", &self.hyper_config)
            .field("interceptors_count", &self.interceptors.len())
            .finish()
    }
}

impl ClientBuilder {
    // ========================================================================
    // Request Defaults
    // ========================================================================

    /// Set the default configuration merged under every call-site config.
    #[must_use]
    pub fn defaults(mut self, defaults: RequestConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Add a default header.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.defaults = self.defaults.with_header(name, value);
        self
    }

    // ========================================================================
    // Transports
    // ========================================================================

    /// Set the instance transport, used unless a request overrides it.
    #[must_use]
    pub fn transport(self, transport: impl Transport) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Set the instance transport from a shared instance.
    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject the fallback transport used when neither the request nor the
    /// instance names one. Typically shared between many clients.
    ///
    /// Without it, a [`HyperTransport`] is built on first use.
    #[must_use]
    pub fn default_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.default_transport = Some(transport);
        self
    }

    /// Replace the whole configuration of the built-in hyper transport.
    #[must_use]
    pub fn hyper_config(mut self, config: TransportConfig) -> Self {
        self.hyper_config = config;
        self
    }

    /// Set the request timeout of the built-in hyper transport.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.hyper_config.timeout = timeout;
        self
    }

    /// Set the connection timeout of the built-in hyper transport.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.hyper_config.connect_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host of the built-in hyper transport.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.hyper_config.pool_idle_per_host = count;
        self
    }

    // ========================================================================
    // Middleware
    // ========================================================================

    /// Register interceptors at build time, in order.
    #[must_use]
    pub fn with(mut self, interceptors: Interceptors) -> Self {
        self.interceptors.push(interceptors);
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the client.
    #[must_use]
    pub fn build(self) -> Client {
        let pipeline = Arc::new(Pipeline {
            request: Chain::new(),
            response: Chain::new(),
            error: Chain::new(),
            defaults: self.defaults,
            transport: self.transport,
            default_transport: self.default_transport,
            hyper_config: self.hyper_config,
            hyper: OnceLock::new(),
        });

        for interceptors in self.interceptors {
            pipeline.register(interceptors);
        }

        let loader = Loader::new(PipelineBatch(Arc::clone(&pipeline)));
        Client { pipeline, loader }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport_fn;

    fn echo() -> impl Transport {
        transport_fn(|descriptor: Descriptor| async move {
            Ok(Response::ok(format!(
                "{} {}",
                descriptor.method(),
                descriptor.url()
            )))
        })
    }

    #[test]
    fn build_merges_defaults_and_pins_method() {
        let client = Client::builder()
            .header("accept", "application/json")
            .header("x-client", "default")
            .transport(echo())
            .build();

        let descriptor = client.pipeline.build(
            Method::Post,
            "http://example.org".to_string(),
            RequestConfig::new()
                .with_method(Method::Get)
                .with_header("X-Client", "call"),
        );

        assert_eq!(descriptor.method(), Method::Post);
        assert_eq!(descriptor.config().header("accept"), Some("application/json"));
        assert_eq!(descriptor.config().header("x-client"), Some("call"));
    }

    #[test]
    fn recovery_into_result() {
        assert!(Recovery::from(Response::ok("x")).into_result().is_ok());
        let failed = Recovery::from(Error::Timeout);
        assert!(failed.error().is_some_and(Error::is_timeout));
        assert!(failed.into_result().is_err());
    }

    #[test]
    fn builder_registers_interceptors() {
        let client = Client::builder()
            .transport(echo())
            .with(Interceptors::new().on_response(crate::middleware::RaiseForStatus))
            .with(
                Interceptors::new()
                    .on_request(crate::middleware::Logging::new())
                    .on_response(crate::middleware::Logging::new()),
            )
            .build();

        assert_eq!(client.request_chain().len(), 1);
        assert_eq!(client.response_chain().len(), 2);
        assert!(client.error_chain().is_empty());
    }

    #[tokio::test]
    async fn empty_error_chain_rethrows() {
        let client = Client::builder()
            .transport(transport_fn(|_: Descriptor| async {
                Err(Error::connection("refused"))
            }))
            .build();

        let err = client
            .get("http://example.org", RequestConfig::new())
            .await
            .expect_err("should fail");
        assert!(err.is_connection());
    }

    #[test]
    fn builder_tunes_fallback_transport() {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .pool_idle_per_host(4)
            .build();
        assert_eq!(client.pipeline.hyper_config.timeout, Duration::from_secs(2));
        assert_eq!(client.pipeline.hyper_config.pool_idle_per_host, 4);

        let replaced = Client::builder()
            .timeout(Duration::from_secs(2))
            .hyper_config(TransportConfig::default())
            .build();
        assert_eq!(replaced.pipeline.hyper_config, TransportConfig::default());
    }

    #[test]
    fn client_is_debug() {
        let client = Client::builder().transport(echo()).build();
        let debug = format!("{client:?}");
        assert!(debug.contains("Client"));
    }
}
