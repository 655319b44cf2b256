//! HTTP/1 transport adapter.
//!
//! The server accepts TCP connections, serves each on its own task with
//! hyper, buffers the request body and hands the request to an
//! [`Endpoint`]. Every carrier it creates is seeded with the capabilities in
//! [`transport_capabilities`]; an endpoint that assumes anything else is
//! refused by [`Server::new`].
//!
//! Failures that happen before the endpoint runs, or while it is still
//! running when the request timeout expires, are answered by the server
//! itself:
//!
//! | Condition | Status |
//! |---|---|
//! | body larger than `max_body_bytes` | `413` |
//! | body not received within the request timeout | `408` |
//! | body stream error | `400` |
//! | endpoint still running at the request timeout | `504` |
//!
//! # Example
//!
//! ```rust,ignore
//! use ctxware_config::ConfigLoader;
//! use ctxware_server::Server;
//!
//! let config = ConfigLoader::new().with_env_prefix("CTXWARE").load()?;
//! Server::new(config.server, endpoint)?.run().await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use ctxware_config::ServerConfig;
use ctxware_core::{CapabilitySet, Carrier, Failure, RemoteAddrKey};
use ctxware_middleware::{Endpoint, Response};
use http::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Capabilities seeded on every carrier this transport creates.
pub fn transport_capabilities() -> CapabilitySet {
    CapabilitySet::of::<RemoteAddrKey>()
}

/// Serves one [`Endpoint`] over HTTP/1.
pub struct Server {
    config: ServerConfig,
    endpoint: Endpoint,
}

impl Server {
    /// Creates a server for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnsatisfiedCapabilities`] when the endpoint's
    /// pipeline assumes capabilities outside [`transport_capabilities`].
    pub fn new(config: ServerConfig, endpoint: Endpoint) -> Result<Self, ServerError> {
        let missing = endpoint.assumed().difference(&transport_capabilities());
        if !missing.is_empty() {
            return Err(ServerError::UnsatisfiedCapabilities { missing });
        }

        Ok(Self { config, endpoint })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the endpoint being served.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindError`] if the address is invalid or
    /// cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("failed to bind to {addr}: {e}")))?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// triggers, then waits up to the shutdown timeout for open connections
    /// to drain.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            stages = ?self.endpoint.stage_names(),
            "server listening"
        );

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let open = tracker.open();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                tracing::debug!(remote_addr = %remote_addr, error = %e, "connection error");
                            }
                            drop(open);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },

                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let shutdown_timeout = server.config.shutdown_timeout();
        tracing::info!(
            active = tracker.active(),
            timeout_secs = shutdown_timeout.as_secs(),
            "draining connections"
        );

        tokio::select! {
            () = tracker.idle() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(shutdown_timeout) => {
                tracing::warn!(
                    active = tracker.active(),
                    "shutdown timeout reached with connections still open"
                );
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |request: http::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(request, remote_addr).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => return result,
            () = shutdown.recv() => {
                tracing::debug!(remote_addr = %remote_addr, "closing connection for shutdown");
                conn.as_mut().graceful_shutdown();
            }
        }

        conn.await
    }

    async fn handle_request(&self, request: http::Request<Incoming>, remote_addr: SocketAddr) -> Response {
        let timeout = self.config.request_timeout();
        let (parts, body) = request.into_parts();

        let collected = tokio::time::timeout(
            timeout,
            Limited::new(body, self.config.max_body_bytes).collect(),
        )
        .await;

        let body = match collected {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::debug!(
                    path = %parts.uri.path(),
                    limit = self.config.max_body_bytes,
                    "request body too large"
                );
                return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
            }
            Ok(Err(e)) => {
                tracing::debug!(path = %parts.uri.path(), error = %e, "failed to read request body");
                return error_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
            Err(_) => {
                tracing::warn!(path = %parts.uri.path(), "request body timed out");
                return error_response(StatusCode::REQUEST_TIMEOUT, "request body timed out");
            }
        };

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let request = http::Request::from_parts(parts, body);
        let carrier = Carrier::new().provide::<RemoteAddrKey>(remote_addr);

        match tokio::time::timeout(timeout, self.endpoint.call(carrier, request)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    timeout_ms = self.config.request_timeout_ms,
                    "endpoint timed out"
                );
                error_response(StatusCode::GATEWAY_TIMEOUT, "request timed out")
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("stages", &self.endpoint.stage_names())
            .finish()
    }
}

/// A JSON failure body in the same shape the error boundary writes.
fn error_response(status: StatusCode, message: &str) -> Response {
    let body = Failure::new(status, message).to_body(false);
    let bytes = serde_json::to_vec(&body).unwrap_or_default();

    let mut response = http::Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxware_core::{Capability, StageResult};
    use ctxware_middleware::{handler_fn, Pipeline};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct TenantKey;

    impl Capability for TenantKey {
        const TAG: &'static str = "tenant";
        type Value = String;
    }

    fn echo_remote() -> Endpoint {
        Pipeline::builder()
            .assume::<RemoteAddrKey>()
            .build()
            .unwrap()
            .then(handler_fn(|carrier, request, sink| {
                let remote = carrier.get::<RemoteAddrKey>().map(SocketAddr::ip);
                let size = request.body().len();
                Box::pin(async move {
                    sink.write(format!("{} {size}", remote.map(|ip| ip.to_string()).unwrap_or_default()));
                    Ok(())
                })
            }))
    }

    fn config(max_body_bytes: usize, request_timeout_ms: u64) -> ServerConfig {
        ServerConfig {
            http_addr: "127.0.0.1:0".to_string(),
            shutdown_timeout_secs: 1,
            request_timeout_ms,
            max_body_bytes,
        }
    }

    async fn start(server: Server) -> (SocketAddr, ShutdownSignal, tokio::task::JoinHandle<Result<(), ServerError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(server.serve(listener, shutdown.clone()));
        (addr, shutdown, handle)
    }

    async fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_transport_capabilities() {
        assert_eq!(transport_capabilities(), CapabilitySet::of::<RemoteAddrKey>());
    }

    #[test]
    fn test_new_rejects_unsatisfied_assumptions() {
        let endpoint = Pipeline::builder()
            .assume::<TenantKey>()
            .build()
            .unwrap()
            .then(handler_fn(|_c, _r, _s| Box::pin(async { StageResult::Ok(()) })));

        match Server::new(ServerConfig::default(), endpoint) {
            Err(ServerError::UnsatisfiedCapabilities { missing }) => {
                assert_eq!(missing, CapabilitySet::of::<TenantKey>());
            }
            other => panic!("expected UnsatisfiedCapabilities, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_invalid_address() {
        let server = Server::new(
            ServerConfig {
                http_addr: "not-a-valid-address".to_string(),
                ..ServerConfig::default()
            },
            echo_remote(),
        )
        .unwrap();

        let result = server.run_with_shutdown(ShutdownSignal::new()).await;
        assert!(matches!(result, Err(ServerError::BindError(msg)) if msg.contains("server.http_addr")));
    }

    #[tokio::test]
    async fn test_run_and_shutdown() {
        let server = Server::new(config(1024, 1000), echo_remote()).unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(5), server.run_with_shutdown(shutdown)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_serves_request_with_remote_addr() {
        let server = Server::new(config(1024, 1000), echo_remote()).unwrap();
        let (addr, shutdown, handle) = start(server).await;

        let response = exchange(
            addr,
            "POST /echo HTTP/1.1\r\nhost: test\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("127.0.0.1 5"), "{response}");

        shutdown.trigger();
        assert!(matches!(handle.await, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let server = Server::new(config(4, 1000), echo_remote()).unwrap();
        let (addr, shutdown, _handle) = start(server).await;

        let response = exchange(
            addr,
            "POST /echo HTTP/1.1\r\nhost: test\r\ncontent-length: 10\r\nconnection: close\r\n\r\n0123456789",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 413"), "{response}");
        assert!(response.contains(r#"{"message":"request body too large"}"#), "{response}");
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_slow_endpoint_is_504() {
        let endpoint = Pipeline::builder()
            .build()
            .unwrap()
            .then(handler_fn(|_c, _r, _s| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    StageResult::Ok(())
                })
            }));
        let server = Server::new(config(1024, 50), endpoint).unwrap();
        let (addr, shutdown, _handle) = start(server).await;

        let response = exchange(addr, "GET / HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n").await;

        assert!(response.starts_with("HTTP/1.1 504"), "{response}");
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = error_response(StatusCode::REQUEST_TIMEOUT, "request body timed out");
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "request body timed out");
    }
}
