//! Per-request values the application middleware hands downstream to the
//! signature/cache-control/limiter layers and the final handlers, threaded
//! through `axum`'s request [`Extensions`](axum::http::Extensions) rather
//! than re-parsed at every layer.

use bytes::Bytes;

#[derive(Clone)]
pub struct DeviceId(pub String);

#[derive(Clone)]
pub struct DeviceIp(pub String);

/// The request body, buffered once by the application middleware so every
/// inner layer that needs it (signature verification, ETag computation)
/// reads the same bytes instead of racing an already-consumed body stream.
#[derive(Clone)]
pub struct RequestBody(pub Bytes);
