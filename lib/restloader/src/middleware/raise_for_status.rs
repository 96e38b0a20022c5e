//! Response-phase middleware rejecting non-2xx responses.

use std::future;

use futures_util::future::BoxFuture;

use crate::{Error, Middleware, Next, Response, Result};

/// Turns every non-2xx response into an [`Error::Http`] carrying the status,
/// its canonical reason and the response body.
///
/// The error then flows through the error phase like any transport failure,
/// so error middleware can recover from it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaiseForStatus;

impl Middleware<Response> for RaiseForStatus {
    fn handle<'a>(
        &'a self,
        response: Response,
        next: Next<Response>,
    ) -> BoxFuture<'a, Result<Response>> {
        if response.is_success() {
            return next.run(response);
        }

        let status = response.status();
        let reason = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown Status");
        let (_, _, body) = response.into_parts();

        Box::pin(future::ready(Err(Error::http_with_body(status, reason, body))))
    }
}
