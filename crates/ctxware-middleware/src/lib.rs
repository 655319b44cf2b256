//! # ctxware middleware
//!
//! Composes independently written stages into one request handler.
//!
//! Each stage declares the capabilities it provides and requires. A
//! [`Pipeline`] can only be built from a list whose requirements are met by
//! earlier stages, so an ordering mistake is a startup error rather than a
//! missing value at request time.
//!
//! ```text
//! Pipeline::builder()          validate()           then(handler)
//!   .stage(A).stage(B)  ──→  requires ⊆ earlier  ──→  Endpoint
//!                             provides                  │
//!                                                       ▼
//!            boundary ─→ A ─→ B ─→ handler   (carrier layered per stage)
//!            boundary ←─ A ←─ B ←─┘          (result unwinds, written once)
//! ```
//!
//! ## Key Types
//!
//! | Type | Role |
//! |---|---|
//! | [`Stage`] | A wrapping step with declared capabilities |
//! | [`Handler`] | The terminal step |
//! | [`Next`] | The rest of the chain, run at most once |
//! | [`Pipeline`] | A validated stage list; also usable as a stage |
//! | [`Endpoint`] | Pipeline + handler + error boundary |
//! | [`ResponseSink`] | Buffered response with a committed flag |
//!
//! ## Example
//!
//! ```
//! use ctxware_core::{Carrier, Failure, RequestIdKey, StageError};
//! use ctxware_middleware::stages::RequestIdStage;
//! use ctxware_middleware::{handler_fn, Pipeline};
//!
//! # tokio_test::block_on(async {
//! let endpoint = Pipeline::builder()
//!     .stage(RequestIdStage::new())
//!     .build()?
//!     .then(handler_fn(|carrier, _request, sink| {
//!         let id = carrier.get::<RequestIdKey>().map(ToString::to_string);
//!         Box::pin(async move {
//!             match id {
//!                 Some(id) => {
//!                     sink.write(id);
//!                     Ok(())
//!                 }
//!                 None => Err(StageError::from(Failure::internal("no request id"))),
//!             }
//!         })
//!     }));
//!
//! let request = http::Request::builder().uri("/").body(bytes::Bytes::new())?;
//! let response = endpoint.call(Carrier::new(), request).await;
//! assert_eq!(response.status(), http::StatusCode::OK);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/ctxware-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod pipeline;
pub mod registry;
pub mod sink;
pub mod stage;
pub mod stages;
pub mod types;

pub use boundary::{BoundaryConfig, Endpoint, Outcome};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use registry::{validate, DependencyError};
pub use sink::{ResponseSink, SinkError};
pub use stage::{handler_fn, stage_fn, BoxedStage, FnHandler, FnStage, Handler, Next, Stage};
pub use types::{BoxFuture, Request, Response};
