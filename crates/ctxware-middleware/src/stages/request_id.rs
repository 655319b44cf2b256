//! Request ID stage.
//!
//! Establishes [`RequestIdKey`] for every later stage. The id is a fresh
//! UUID v7 unless the stage is told to trust a valid incoming
//! `X-Request-ID` header, which suits internal service-to-service traffic.
//! The id is echoed in the `X-Request-ID` response header.

use ctxware_core::{CapabilitySet, Carrier, RequestId, RequestIdKey, StageError, StageResult};
use http::header::{HeaderName, HeaderValue};

use crate::sink::ResponseSink;
use crate::stage::{Next, Stage};
use crate::types::{BoxFuture, Request};

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stage that generates or propagates the request id.
#[derive(Debug, Clone, Default)]
pub struct RequestIdStage {
    trust_incoming: bool,
}

impl RequestIdStage {
    /// Creates a stage that always generates a new id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stage that reuses a valid incoming `X-Request-ID`.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self { trust_incoming: true }
    }

    fn incoming(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }

        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }

    async fn process<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> StageResult {
        let request_id = self.incoming(request).unwrap_or_default();

        let value = HeaderValue::try_from(request_id.to_string()).map_err(StageError::unclassified)?;
        sink.insert_header(HeaderName::from_static(REQUEST_ID_HEADER), value)?;

        next.run(carrier.provide::<RequestIdKey>(request_id), request, sink)
            .await
    }
}

impl Stage for RequestIdStage {
    fn name(&self) -> &str {
        "request_id"
    }

    fn provides(&self) -> CapabilitySet {
        CapabilitySet::of::<RequestIdKey>()
    }

    fn handle<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(self.process(carrier, request, sink, next))
    }
}
