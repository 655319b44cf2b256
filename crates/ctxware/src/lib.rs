//! # ctxware
//!
//! **Capability-checked middleware composition for async HTTP services**
//!
//! Stages declare which capabilities they provide and which they require.
//! A pipeline is validated when it is assembled, so a stage that reads the
//! tenant before the tenant stage ran is a startup error, not a `None` at
//! request time. Requests flow through the stages with an immutable,
//! layered carrier and every failure is turned into a response at one
//! boundary.
//!
//! ```text
//! Request → RequestId → RequestLog → ConcurrencyLimit → … → Handler
//!                                                              ↓
//! Response ← boundary ← RequestLog ← ConcurrencyLimit ← … ←───┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ctxware::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("CTXWARE").load()?;
//!     init_logging(&config.logging)?;
//!
//!     let endpoint = Pipeline::builder()
//!         .assume::<RemoteAddrKey>()
//!         .stage(RequestIdStage::new())
//!         .stage(RequestLogStage::with_config(config.request_log.clone()))
//!         .stage(ConcurrencyLimitStage::with_config(config.limit.clone()))
//!         .build()?
//!         .then(handler_fn(|_carrier, _request, sink| {
//!             Box::pin(async move {
//!                 sink.write("hello");
//!                 Ok(())
//!             })
//!         }))
//!         .with_boundary(config.boundary.clone());
//!
//!     Server::new(config.server, endpoint)?.run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/ctxware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use ctxware_config as config;
pub use ctxware_core as core;
pub use ctxware_middleware as middleware;
pub use ctxware_server as server;
pub use ctxware_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ctxware::prelude::*;
/// ```
pub mod prelude {
    pub use ctxware_core::{
        Capability, CapabilitySet, Carrier, Failure, RemoteAddrKey, RequestId, RequestIdKey,
        StageError, StageResult, Tag,
    };

    pub use ctxware_middleware::stages::{
        ConcurrencyLimitStage, LimitConfig, RequestIdStage, RequestLogConfig, RequestLogStage,
    };
    pub use ctxware_middleware::{
        handler_fn, stage_fn, BoundaryConfig, BoxFuture, BoxedStage, DependencyError, Endpoint,
        Handler, Next, Outcome, Pipeline, Request, Response, ResponseSink, Stage,
    };

    pub use ctxware_config::{ConfigLoader, CtxwareConfig, ServerConfig};
    pub use ctxware_server::{Server, ShutdownSignal};
    pub use ctxware_telemetry::{init_logging, LogConfig};
}
