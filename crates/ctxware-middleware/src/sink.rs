//! The buffered response sink.
//!
//! Stages and handlers write their response into a [`ResponseSink`]. The
//! status line is committed at most once: [`ResponseSink::write_head`] on a
//! committed sink fails, and body writes commit `200 OK` implicitly. Header
//! changes after the commit are rejected by [`ResponseSink::insert_header`].

use bytes::BytesMut;
use ctxware_core::StageError;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use thiserror::Error;

use crate::types::Response;

/// Misuse of a [`ResponseSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The head was already written.
    #[error("response already committed with status {0}")]
    AlreadyCommitted(StatusCode),
}

impl From<SinkError> for StageError {
    fn from(err: SinkError) -> Self {
        Self::unclassified(err)
    }
}

#[derive(Debug)]
struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

/// Per-request response buffer with a committed flag.
#[derive(Debug, Default)]
pub struct ResponseSink {
    pending: HeaderMap,
    head: Option<Head>,
    body: BytesMut,
}

impl ResponseSink {
    /// Creates an uncommitted, empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the head has been written.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.head.is_some()
    }

    /// Returns the committed status, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.head.as_ref().map(|head| head.status)
    }

    /// Returns the headers that were or will be sent.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.head.as_ref().map_or(&self.pending, |head| &head.headers)
    }

    /// Sets a header, replacing any previous value.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), SinkError> {
        if let Some(status) = self.status() {
            return Err(SinkError::AlreadyCommitted(status));
        }
        self.pending.insert(name, value);
        Ok(())
    }

    /// Commits the status and the headers set so far.
    pub fn write_head(&mut self, status: StatusCode) -> Result<(), SinkError> {
        if let Some(committed) = self.status() {
            tracing::warn!(
                committed = committed.as_u16(),
                attempted = status.as_u16(),
                "ignoring second write of response head"
            );
            return Err(SinkError::AlreadyCommitted(committed));
        }
        self.head = Some(Head {
            status,
            headers: std::mem::take(&mut self.pending),
        });
        Ok(())
    }

    /// Appends to the body, committing `200 OK` first if nothing was written.
    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        if self.head.is_none() {
            self.head = Some(Head {
                status: StatusCode::OK,
                headers: std::mem::take(&mut self.pending),
            });
        }
        self.body.extend_from_slice(data.as_ref());
    }

    /// Writes `value` as a JSON response with the given status.
    pub fn json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), StageError> {
        let body = serde_json::to_vec(value).map_err(StageError::unclassified)?;
        self.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))?;
        self.write_head(status)?;
        self.write(body);
        Ok(())
    }

    /// Writes a plain-text response with the given status.
    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) -> Result<(), SinkError> {
        let body: String = body.into();
        self.insert_header(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )?;
        self.write_head(status)?;
        self.write(body);
        Ok(())
    }

    /// Returns the bytes buffered so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts the sink into the final response.
    ///
    /// A sink that was never committed becomes an empty `200 OK`.
    #[must_use]
    pub fn into_response(self) -> Response {
        let Head { status, headers } = self.head.unwrap_or(Head {
            status: StatusCode::OK,
            headers: self.pending,
        });
        let mut response = Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::BodyExt;

    async fn body_of(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_new_sink_is_uncommitted() {
        let sink = ResponseSink::new();
        assert!(!sink.is_committed());
        assert_eq!(sink.status(), None);
    }

    #[test]
    fn test_write_head_once() {
        let mut sink = ResponseSink::new();
        sink.write_head(StatusCode::CREATED).unwrap();
        assert_eq!(sink.status(), Some(StatusCode::CREATED));

        let err = sink.write_head(StatusCode::BAD_REQUEST).unwrap_err();
        assert_eq!(err, SinkError::AlreadyCommitted(StatusCode::CREATED));
        assert_eq!(sink.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn test_write_commits_ok() {
        let mut sink = ResponseSink::new();
        sink.write("hello");
        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body(), b"hello");
    }

    #[test]
    fn test_headers_frozen_after_commit() {
        let mut sink = ResponseSink::new();
        sink.insert_header(
            HeaderName::from_static("x-stage"),
            HeaderValue::from_static("a"),
        )
        .unwrap();
        sink.write_head(StatusCode::OK).unwrap();

        assert_eq!(sink.headers()["x-stage"], "a");
        assert!(sink
            .insert_header(HeaderName::from_static("x-late"), HeaderValue::from_static("b"))
            .is_err());
    }

    #[tokio::test]
    async fn test_json_response() {
        let mut sink = ResponseSink::new();
        sink.json(StatusCode::ACCEPTED, &serde_json::json!({ "ok": true }))
            .unwrap();

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_of(response).await, Bytes::from_static(b"{\"ok\":true}"));
    }

    #[tokio::test]
    async fn test_uncommitted_sink_becomes_empty_ok() {
        let mut sink = ResponseSink::new();
        sink.insert_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("abc"),
        )
        .unwrap();

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "abc");
        assert!(body_of(response).await.is_empty());
    }

    #[test]
    fn test_sink_error_is_unclassified() {
        let err: StageError = SinkError::AlreadyCommitted(StatusCode::OK).into();
        assert!(!err.is_classified());
    }
}
