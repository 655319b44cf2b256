//! Request logging stage.
//!
//! Logs `new request` on the way in and the outcome on the way out:
//!
//! | Outcome | Level | Message |
//! |---|---|---|
//! | status >= 500 | `ERROR` | `request resulted in server error` |
//! | status 400-499 | `INFO` | `request resulted in client error` |
//! | otherwise | `INFO` | `request successful` |
//!
//! The stage requires nothing. When the request id or the remote address
//! has been established upstream it is added to every event. Panics from
//! downstream are logged and then resumed so the boundary still sees them.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use ctxware_core::{Carrier, RemoteAddrKey, RequestIdKey, StageError, StageResult};
use futures_util::FutureExt;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::sink::ResponseSink;
use crate::stage::{Next, Stage};
use crate::types::{BoxFuture, Request};

/// Request logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestLogConfig {
    /// Log when the request comes in.
    pub start: bool,
    /// Log when the request completes.
    pub end: bool,
    /// Include the `Referer` header.
    pub referer: bool,
    /// Include the remote address, when the transport provides it.
    pub remote_addr: bool,
    /// Request headers to include.
    pub headers: Vec<String>,
    /// Skip the completion event for statuses below 400.
    pub ignore_under_400: bool,
    /// Skip the completion event for 4xx statuses.
    pub ignore_4xx: bool,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            start: true,
            end: true,
            referer: false,
            remote_addr: false,
            headers: Vec::new(),
            ignore_under_400: false,
            ignore_4xx: false,
        }
    }
}

impl RequestLogConfig {
    /// Returns the level and message for a completed request, or `None`
    /// when the completion event is suppressed.
    pub fn completion(&self, status: StatusCode) -> Option<(Level, &'static str)> {
        if !self.end {
            None
        } else if status.is_server_error() {
            Some((Level::ERROR, "request resulted in server error"))
        } else if status.is_client_error() {
            (!self.ignore_4xx).then_some((Level::INFO, "request resulted in client error"))
        } else {
            (!self.ignore_under_400).then_some((Level::INFO, "request successful"))
        }
    }
}

/// Stage that logs each request.
#[derive(Debug, Clone, Default)]
pub struct RequestLogStage {
    config: RequestLogConfig,
}

impl RequestLogStage {
    /// Creates a stage with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stage with the given settings.
    #[must_use]
    pub fn with_config(config: RequestLogConfig) -> Self {
        Self { config }
    }

    /// Returns the settings.
    pub fn config(&self) -> &RequestLogConfig {
        &self.config
    }

    fn fields(&self, carrier: &Carrier, request: &Request) -> RequestFields {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        RequestFields {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            request_id: carrier
                .get::<RequestIdKey>()
                .map(ToString::to_string)
                .unwrap_or_default(),
            remote_addr: if self.config.remote_addr {
                carrier
                    .get::<RemoteAddrKey>()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            } else {
                String::new()
            },
            referer: if self.config.referer {
                header(http::header::REFERER.as_str())
            } else {
                String::new()
            },
            headers: self
                .config
                .headers
                .iter()
                .map(|name| format!("{name}={}", header(name)))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    async fn process<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> StageResult {
        let fields = self.fields(&carrier, request);
        if self.config.start {
            tracing::info!(
                method = %fields.method,
                path = %fields.path,
                request_id = %fields.request_id,
                remote_addr = %fields.remote_addr,
                referer = %fields.referer,
                headers = %fields.headers,
                "new request"
            );
        }

        let started = Instant::now();
        let result = match AssertUnwindSafe(async { next.run(carrier, request, &mut *sink).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                tracing::error!(
                    method = %fields.method,
                    path = %fields.path,
                    request_id = %fields.request_id,
                    "handler panic detected"
                );
                std::panic::resume_unwind(payload);
            }
        };

        let status = reported_status(&result, sink.status());
        if let Some((level, message)) = self.config.completion(status) {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let error = match &result {
                Err(StageError::Failure(failure)) => failure.message().to_string(),
                Err(StageError::Unclassified(error)) => error.to_string(),
                Ok(()) => String::new(),
            };
            if level == Level::ERROR {
                tracing::error!(
                    method = %fields.method,
                    path = %fields.path,
                    request_id = %fields.request_id,
                    remote_addr = %fields.remote_addr,
                    status = status.as_u16(),
                    elapsed_ms,
                    error = %error,
                    "{message}"
                );
            } else {
                tracing::info!(
                    method = %fields.method,
                    path = %fields.path,
                    request_id = %fields.request_id,
                    remote_addr = %fields.remote_addr,
                    status = status.as_u16(),
                    elapsed_ms,
                    error = %error,
                    "{message}"
                );
            }
        }

        result
    }
}

/// The status the client receives: a committed head wins over a later error.
fn reported_status(result: &StageResult, committed: Option<StatusCode>) -> StatusCode {
    match (result, committed) {
        (_, Some(committed)) => committed,
        (Ok(()), None) => StatusCode::OK,
        (Err(error), None) => error.status(),
    }
}

struct RequestFields {
    method: String,
    path: String,
    request_id: String,
    remote_addr: String,
    referer: String,
    headers: String,
}

impl Stage for RequestLogStage {
    fn name(&self) -> &str {
        "request_log"
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
