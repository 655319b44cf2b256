//! Collected responses.

use bytes::Bytes;
use ctxware_middleware::{Outcome, Response};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::error::TestError;

/// A fully buffered response plus the boundary's outcome.
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    outcome: Outcome,
}

impl TestResponse {
    /// Buffers an endpoint response.
    pub async fn collect(response: Response, outcome: Outcome) -> Self {
        let (parts, body) = response.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        Self {
            status: parts.status,
            headers: parts.headers,
            body,
            outcome,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// How the request left the error boundary.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Gets a header value by name.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// Gets a header value as a string.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as a string.
    pub fn text(&self) -> Result<String, TestError> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Deserializes the body as a JSON value.
    pub fn json_value(&self) -> Result<serde_json::Value, TestError> {
        self.json()
    }

    /// The `message` of a JSON failure body.
    pub fn failure_message(&self) -> Option<String> {
        self.json_value()
            .ok()?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }

    /// Asserts the status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "expected status {expected}, got {} with body {:?}",
            self.status, self.body
        );
        self
    }

    /// Asserts a header value.
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(actual, expected.as_ref(), "header '{name}'");
        self
    }

    /// Asserts the body text.
    ///
    /// # Panics
    ///
    /// Panics if the body is not UTF-8 or differs.
    pub fn assert_body_eq(&self, expected: impl AsRef<str>) -> &Self {
        let body = self
            .text()
            .unwrap_or_else(|e| panic!("body should be text: {e}"));
        assert_eq!(body, expected.as_ref(), "body mismatch");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    async fn response(status: StatusCode, body: &'static str) -> TestResponse {
        let response = http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap();
        TestResponse::collect(response, Outcome::Completed).await
    }

    #[tokio::test]
    async fn test_accessors() {
        let response = response(StatusCode::CREATED, r#"{"id": 7}"#).await;

        response
            .assert_status(StatusCode::CREATED)
            .assert_header("content-type", "application/json");
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.json_value().unwrap()["id"], 7);
        assert_eq!(response.outcome(), Outcome::Completed);
        assert!(response.failure_message().is_none());
    }

    #[tokio::test]
    async fn test_failure_message() {
        let response = response(StatusCode::NOT_FOUND, r#"{"message": "no such user"}"#).await;
        assert_eq!(response.failure_message().as_deref(), Some("no such user"));
    }

    #[tokio::test]
    #[should_panic(expected = "expected status 200 OK")]
    async fn test_assert_status_panics() {
        response(StatusCode::BAD_REQUEST, "{}")
            .await
            .assert_status(StatusCode::OK);
    }
}
