//! Common types used throughout the pipeline.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::Full;

/// The request type seen by stages.
///
/// The transport buffers the body before the chain runs, so stages can read
/// it by reference any number of times.
pub type Request = http::Request<Bytes>;

/// The response type produced by an [`Endpoint`](crate::Endpoint).
pub type Response = http::Response<Full<Bytes>>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
