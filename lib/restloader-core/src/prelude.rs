//! Prelude module for convenient imports.
//!
//! ```ignore
//! use restloader_core::prelude::*;
//! ```

pub use crate::{
    BoxFuture, Chain, Descriptor, Error, Method, Middleware, Next, RequestConfig, Response,
    Result, Transport, middleware_fn, transport_fn,
};
