//! # ctxware test
//!
//! In-memory testing for ctxware endpoints. [`TestClient`] builds requests,
//! seeds the carrier the way `ctxware-server` does and returns a buffered
//! [`TestResponse`] that also records the error boundary's
//! [`Outcome`](ctxware_middleware::Outcome).
//!
//! ```ignore
//! use ctxware_test::TestClient;
//!
//! #[tokio::test]
//! async fn test_rejects_unknown_user() {
//!     let client = TestClient::new(app_endpoint());
//!
//!     let response = client.get("/users/404").send().await;
//!
//!     response.assert_status(StatusCode::NOT_FOUND);
//!     assert_eq!(response.failure_message().as_deref(), Some("no such user"));
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use response::TestResponse;
