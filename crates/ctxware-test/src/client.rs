//! In-memory test client.

use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;
use ctxware_core::{Carrier, RemoteAddrKey};
use ctxware_middleware::{Endpoint, Request};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;

use crate::error::TestError;
use crate::response::TestResponse;

/// Drives an [`Endpoint`] without a socket.
///
/// Each request gets a carrier seeded the way the server seeds it, with
/// [`RemoteAddrKey`] set to [`remote_addr`](Self::remote_addr), layered on
/// top of an optional base carrier for anything else the pipeline assumes.
///
/// ```ignore
/// let client = TestClient::new(endpoint);
/// let response = client.get("/users/7").header("x-tenant", "acme").send().await;
/// response.assert_status(StatusCode::OK);
/// ```
#[must_use]
#[derive(Clone)]
pub struct TestClient {
    endpoint: Endpoint,
    remote_addr: SocketAddr,
    base: Carrier,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Default remote address of test requests.
    pub const DEFAULT_REMOTE_ADDR: SocketAddr =
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000);

    /// Creates a client for `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            remote_addr: Self::DEFAULT_REMOTE_ADDR,
            base: Carrier::new(),
            default_headers: Vec::new(),
        }
    }

    /// Sets the remote address seeded on each carrier.
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    /// Sets a carrier that every request's carrier is layered on.
    pub fn with_carrier(mut self, base: Carrier) -> Self {
        self.base = base;
        self
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Returns the remote address seeded on each carrier.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns the endpoint under test.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        let mut builder = http::Request::builder().method(method).uri(uri.as_ref());
        for (name, value) in &self.default_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        TestClientRequest {
            client: self,
            builder,
            body: Bytes::new(),
            json_error: None,
        }
    }

    /// Runs an already built request through the endpoint.
    pub async fn send_request(&self, request: Request) -> TestResponse {
        let carrier = self.base.provide::<RemoteAddrKey>(self.remote_addr);
        let (response, outcome) = self.endpoint.call_with_outcome(carrier, request).await;
        TestResponse::collect(response, outcome).await
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("stages", &self.endpoint.stage_names())
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// A request being built for a [`TestClient`].
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: http::request::Builder,
    body: Bytes,
    json_error: Option<serde_json::Error>,
}

impl TestClientRequest<'_> {
    /// Sets a header.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `value` as the JSON body and sets the content type.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Bytes::from(bytes),
            Err(e) => self.json_error = Some(e),
        }
        self.builder = self.builder.header(CONTENT_TYPE, "application/json");
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request could not be built.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request, returning build errors.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        if let Some(e) = self.json_error {
            return Err(e.into());
        }
        let request = self.builder.body(self.body)?;
        Ok(self.client.send_request(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxware_core::{Capability, Failure, StageError};
    use ctxware_middleware::{handler_fn, Outcome, Pipeline};
    use http::StatusCode;
    use serde_json::json;

    struct TenantKey;

    impl Capability for TenantKey {
        const TAG: &'static str = "tenant";
        type Value = String;
    }

    fn describe() -> Endpoint {
        Pipeline::builder()
            .assume::<RemoteAddrKey>()
            .build()
            .unwrap()
            .then(handler_fn(|carrier, request, sink| {
                let remote = carrier.get::<RemoteAddrKey>().copied();
                let summary = json!({
                    "method": request.method().as_str(),
                    "path": request.uri().path(),
                    "remote": remote.map(|addr| addr.to_string()),
                    "client": request.headers().get("x-client").and_then(|v| v.to_str().ok()),
                    "body": String::from_utf8_lossy(request.body()),
                });
                Box::pin(async move { sink.json(StatusCode::OK, &summary) })
            }))
    }

    #[tokio::test]
    async fn test_seeds_remote_addr() {
        let client = TestClient::new(describe());
        let response = client.get("/who").send().await;

        response.assert_status(StatusCode::OK);
        let json = response.json_value().unwrap();
        assert_eq!(json["remote"], "127.0.0.1:40000");
        assert_eq!(json["path"], "/who");
        assert_eq!(response.outcome(), Outcome::Completed);
    }

    #[tokio::test]
    async fn test_custom_remote_addr_and_headers() {
        let client = TestClient::new(describe())
            .with_remote_addr("10.0.0.9:1234".parse().unwrap())
            .with_default_header("x-client", "suite");

        let json = client.delete("/items/1").send().await.json_value().unwrap();
        assert_eq!(json["method"], "DELETE");
        assert_eq!(json["remote"], "10.0.0.9:1234");
        assert_eq!(json["client"], "suite");
    }

    #[tokio::test]
    async fn test_json_body() {
        let client = TestClient::new(describe());
        let json = client
            .post("/users")
            .json(&json!({"name": "Alice"}))
            .send()
            .await
            .json_value()
            .unwrap();
        assert_eq!(json["body"], r#"{"name":"Alice"}"#);
    }

    #[tokio::test]
    async fn test_invalid_header_is_build_error() {
        let client = TestClient::new(describe());
        let result = client.put("/x").header("bad header", "v").try_send().await;
        assert!(matches!(result, Err(TestError::RequestBuild(_))));
    }

    #[tokio::test]
    async fn test_base_carrier_satisfies_assumptions() {
        let endpoint = Pipeline::builder()
            .assume::<TenantKey>()
            .build()
            .unwrap()
            .then(handler_fn(|carrier, _request, sink| {
                let tenant = carrier.require::<TenantKey>().cloned();
                Box::pin(async move {
                    sink.write(tenant?);
                    Ok::<(), StageError>(())
                })
            }));

        let missing = TestClient::new(endpoint.clone()).get("/").send().await;
        missing.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(missing.outcome(), Outcome::Unclassified);

        let seeded = TestClient::new(endpoint)
            .with_carrier(Carrier::new().provide::<TenantKey>("acme".to_string()))
            .get("/")
            .send()
            .await;
        seeded.assert_status(StatusCode::OK).assert_body_eq("acme");
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let endpoint = Pipeline::builder().build().unwrap().then(handler_fn(|_c, _r, _s| {
            let result: Result<(), StageError> = Err(Failure::not_found("no such item").into());
            Box::pin(async move { result })
        }));

        let response = TestClient::new(endpoint).get("/items/9").send().await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.outcome(), Outcome::Classified(StatusCode::NOT_FOUND));
        assert_eq!(response.failure_message().as_deref(), Some("no such item"));
    }
}
