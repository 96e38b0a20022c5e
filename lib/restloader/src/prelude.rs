//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions for easy
//! glob importing:
//!
//! ```ignore
//! use restloader::prelude::*;
//! ```

pub use crate::{
    Client, Descriptor, Error, Interceptors, Method, Middleware, Next, Recovery, RequestConfig,
    Response, Result, Transport, middleware_fn, transport_fn,
};
pub use serde::{Deserialize, Serialize};
