//! Stock middleware for the client phases.
//!
//! Each type implements [`Middleware`](crate::Middleware) for the phase
//! values it understands and is registered through
//! [`Interceptors`](crate::Interceptors):
//!
//! | Middleware | Phases | Description |
//! |------------|--------|-------------|
//! | [`BearerAuth`] | request | Sets `authorization: Bearer <token>` |
//! | [`BasicAuth`] | request | Sets `authorization: Basic <base64>` (`middleware-basic-auth`) |
//! | [`Logging`] | request, response, error | Logs every phase with `tracing` |
//! | [`RaiseForStatus`] | response | Turns non-2xx responses into [`Error::Http`](crate::Error::Http) |
//!
//! # Example
//!
//! ```ignore
//! use restloader::{Client, Interceptors};
//! use restloader::middleware::{BearerAuth, Logging, RaiseForStatus};
//!
//! let client = Client::builder()
//!     .with(Interceptors::new().on_request(BearerAuth::new("my-token")))
//!     .with(
//!         Interceptors::new()
//!             .on_request(Logging::new())
//!             .on_response(Logging::new())
//!             .on_error(Logging::new()),
//!     )
//!     .with(Interceptors::new().on_response(RaiseForStatus))
//!     .build();
//! ```
//!
//! Transport-level concerns (retries, concurrency limits, timeouts) are Tower
//! layers instead, see [`ServiceTransport`](crate::ServiceTransport).

#[cfg(feature = "middleware-basic-auth")]
mod basic_auth;
mod bearer_auth;
mod logging;
mod raise_for_status;

#[cfg(feature = "middleware-basic-auth")]
pub use basic_auth::BasicAuth;
pub use bearer_auth::BearerAuth;
pub use logging::{LogLevel, Logging};
pub use raise_for_status::RaiseForStatus;
