//! Request orchestration for HTTP clients.
//!
//! Every request runs through three middleware phases around a pluggable
//! transport, and `GET`s issued through [`Client::load`] are deduplicated,
//! batched per scheduler turn and cached for the lifetime of the client.
//!
//! # Example
//!
//! ```ignore
//! use restloader::prelude::*;
//! use restloader::middleware::{BearerAuth, RaiseForStatus};
//!
//! #[derive(Debug, Deserialize)]
//! pub struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let client = Client::builder()
//!     .header("accept", "application/json")
//!     .with(
//!         Interceptors::new()
//!             .on_request(BearerAuth::new("my-token"))
//!             .on_response(RaiseForStatus),
//!     )
//!     .build();
//!
//! let user: User = client
//!     .load("https://api.example.com/users/42", RequestConfig::new())
//!     .await?
//!     .json()?;
//! ```

mod client;
mod loader;
pub mod middleware;
pub mod prelude;
mod retry;
mod transport;

// Re-export client types
pub use client::{Client, ClientBuilder, Interceptors, Recovery};
pub use loader::{BatchFn, Loader};
pub use retry::RetryPolicy;
pub use transport::{BoxedService, HyperTransport, ServiceTransport, TransportConfig};

// Re-export tower for transport composition
pub use tower;

// Re-export core types
pub use restloader_core::{
    BoxFuture, Chain, Descriptor, Error, Method, Middleware, MiddlewareFn, Next, RequestConfig,
    Response, Result, Transport, TransportFn, middleware_fn, transport_fn,
};
