//! The error boundary.
//!
//! An [`Endpoint`] is a pipeline with its terminal handler attached. Each
//! call creates a fresh [`ResponseSink`], runs the chain and then finalizes
//! the result exactly once:
//!
//! | Chain result | Response |
//! |---|---|
//! | `Ok(())` | whatever the chain wrote (empty `200 OK` if nothing) |
//! | `Err(Failure)` | failure status, JSON `{message, fields}` |
//! | `Err(Unclassified)` | `500`, generic message unless suppression is off |
//! | panic | `500`, same as unclassified |
//!
//! A failure after the response head was committed is logged and the
//! committed response is kept as is.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use ctxware_core::{canonical_message, CapabilitySet, Carrier, FailureBody, StageError, StageResult};
use futures_util::FutureExt;
use http::header::{HeaderValue, X_CONTENT_TYPE_OPTIONS};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::sink::ResponseSink;
use crate::stage::{Handler, Next};
use crate::types::{Request, Response};

/// Error boundary settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundaryConfig {
    /// Hide messages and fields of 5xx failures and unclassified errors.
    pub suppress_internal_messages: bool,
    /// Convert stage panics into a 500 instead of unwinding to the caller.
    pub catch_panics: bool,
    /// Message sent for unclassified errors and panics while suppressing.
    pub internal_message: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            suppress_internal_messages: true,
            catch_panics: true,
            internal_message: canonical_message(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl BoundaryConfig {
    /// Settings for local development: internal messages are exposed.
    #[must_use]
    pub fn development() -> Self {
        Self {
            suppress_internal_messages: false,
            ..Self::default()
        }
    }
}

/// How a request left the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The chain returned `Ok`.
    Completed,
    /// The chain returned a classified failure with this status.
    Classified(StatusCode),
    /// The chain returned an unclassified error.
    Unclassified,
    /// A stage or the handler panicked.
    Panicked,
}

/// A validated pipeline plus terminal handler, ready to serve requests.
///
/// Owns only immutable data and is cheap to clone; one endpoint serves any
/// number of concurrent requests.
#[derive(Clone)]
pub struct Endpoint {
    pipeline: Pipeline,
    handler: Arc<dyn Handler>,
    boundary: BoundaryConfig,
}

impl Endpoint {
    pub(crate) fn new(pipeline: Pipeline, handler: Arc<dyn Handler>) -> Self {
        Self {
            pipeline,
            handler,
            boundary: BoundaryConfig::default(),
        }
    }

    /// Replaces the boundary settings.
    #[must_use]
    pub fn with_boundary(mut self, boundary: BoundaryConfig) -> Self {
        self.boundary = boundary;
        self
    }

    /// Returns the boundary settings.
    pub fn boundary(&self) -> &BoundaryConfig {
        &self.boundary
    }

    /// Returns the pipeline in front of the handler.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Capabilities the caller must seed on every carrier.
    pub fn assumed(&self) -> &CapabilitySet {
        self.pipeline.base()
    }

    /// Returns the names of the top-level stages in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.pipeline.stage_names()
    }

    /// Runs one request and returns the finalized response.
    pub async fn call(&self, carrier: Carrier, request: Request) -> Response {
        self.call_with_outcome(carrier, request).await.0
    }

    /// Runs one request and also reports how it ended.
    pub async fn call_with_outcome(&self, carrier: Carrier, request: Request) -> (Response, Outcome) {
        let mut sink = ResponseSink::new();

        let missing = self.pipeline.base().difference(&carrier.tags());
        let result = if missing.is_empty() {
            self.run_chain(carrier, &request, &mut sink).await
        } else {
            Ok(Err(StageError::Unclassified(anyhow::anyhow!(
                "carrier is missing assumed capabilities {missing}"
            ))))
        };

        let outcome = self.finalize(&request, &mut sink, result);
        (sink.into_response(), outcome)
    }

    async fn run_chain(
        &self,
        carrier: Carrier,
        request: &Request,
        sink: &mut ResponseSink,
    ) -> Result<StageResult, Box<dyn Any + Send>> {
        let stages = self.pipeline.stages();
        let handler = &*self.handler;
        // Stages do synchronous work before returning their future, so the
        // chain must be started inside the caught future.
        let chain = async move { Next::new(stages, handler).run(carrier, request, sink).await };
        if self.boundary.catch_panics {
            AssertUnwindSafe(chain).catch_unwind().await
        } else {
            Ok(chain.await)
        }
    }

    fn finalize(
        &self,
        request: &Request,
        sink: &mut ResponseSink,
        result: Result<StageResult, Box<dyn Any + Send>>,
    ) -> Outcome {
        let suppress = self.boundary.suppress_internal_messages;

        match result {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(StageError::Failure(failure))) => {
                let status = failure.status();
                if status.is_server_error() {
                    tracing::error!(
                        method = %request.method(),
                        path = %request.uri().path(),
                        status = status.as_u16(),
                        error = %failure.message(),
                        "request failed"
                    );
                } else {
                    tracing::debug!(
                        method = %request.method(),
                        path = %request.uri().path(),
                        status = status.as_u16(),
                        error = %failure.message(),
                        "request rejected"
                    );
                }
                write_failure(sink, status, &failure.to_body(suppress));
                Outcome::Classified(status)
            }
            Ok(Err(StageError::Unclassified(error))) => {
                tracing::error!(
                    method = %request.method(),
                    path = %request.uri().path(),
                    error = ?error,
                    "unclassified failure"
                );
                let message = if suppress {
                    self.boundary.internal_message.clone()
                } else {
                    format!("{error:#}")
                };
                write_failure(sink, StatusCode::INTERNAL_SERVER_ERROR, &FailureBody::new(message));
                Outcome::Unclassified
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                tracing::error!(
                    method = %request.method(),
                    path = %request.uri().path(),
                    panic = %detail,
                    "stage panicked"
                );
                let message = if suppress {
                    self.boundary.internal_message.clone()
                } else {
                    format!("panic: {detail}")
                };
                write_failure(sink, StatusCode::INTERNAL_SERVER_ERROR, &FailureBody::new(message));
                Outcome::Panicked
            }
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("pipeline", &self.pipeline)
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

fn write_failure(sink: &mut ResponseSink, status: StatusCode, body: &FailureBody) {
    if let Some(committed) = sink.status() {
        tracing::warn!(
            committed = committed.as_u16(),
            failed = status.as_u16(),
            "failure after response was committed, keeping committed response"
        );
        return;
    }

    let written = sink
        .insert_header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"))
        .map_err(StageError::from)
        .and_then(|()| sink.json(status, body));
    if let Err(error) = written {
        tracing::error!(error = %error, "failed to write error response");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
