//! Core types for the restloader request orchestration layer.
//!
//! This crate provides the building blocks shared by every restloader client:
//! - [`Chain`], [`Middleware`] and [`Next`] - the middleware chain engine
//! - [`Descriptor`] and [`RequestConfig`] - the `{url, config}` request description
//! - [`Response`] - buffered HTTP response
//! - [`Transport`] - contract for the function performing the network call
//! - [`Method`] - HTTP method enum
//! - [`Error`] and [`Result`] - Error handling

mod chain;
mod descriptor;
mod error;
mod method;
pub mod prelude;
mod response;
mod transport;

pub use chain::{Chain, Middleware, MiddlewareFn, Next, middleware_fn};
pub use descriptor::{Descriptor, RequestConfig};
pub use error::{Error, Result};
pub use method::Method;
pub use response::Response;
pub use transport::{Transport, TransportFn, transport_fn};

// Re-export the boxed future type used by middleware and transports
pub use futures_util::future::BoxFuture;
