//! Stage and handler traits.
//!
//! A [`Stage`] wraps everything after it. It receives the carrier built so
//! far, the request, the response sink and a [`Next`] that runs the rest of
//! the chain. Calling `next.run(...)` continues; returning without calling it
//! short-circuits, and nothing inner to the stage runs.
//!
//! # Example
//!
//! ```
//! use ctxware_core::{Capability, CapabilitySet, Carrier, StageResult};
//! use ctxware_middleware::{BoxFuture, Next, Request, ResponseSink, Stage};
//!
//! struct TenantKey;
//!
//! impl Capability for TenantKey {
//!     const TAG: &'static str = "app.tenant";
//!     type Value = String;
//! }
//!
//! struct Tenant;
//!
//! impl Stage for Tenant {
//!     fn name(&self) -> &str {
//!         "tenant"
//!     }
//!
//!     fn provides(&self) -> CapabilitySet {
//!         CapabilitySet::of::<TenantKey>()
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         carrier: Carrier,
//!         request: &'a Request,
//!         sink: &'a mut ResponseSink,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, StageResult> {
//!         let tenant = request
//!             .headers()
//!             .get("x-tenant")
//!             .and_then(|v| v.to_str().ok())
//!             .unwrap_or("public")
//!             .to_string();
//!         next.run(carrier.provide::<TenantKey>(tenant), request, sink)
//!     }
//! }
//! ```

use std::sync::Arc;

use ctxware_core::{CapabilitySet, Carrier, StageResult};

use crate::sink::ResponseSink;
use crate::types::{BoxFuture, Request};

/// A request-handling stage.
///
/// Stages are built once and shared across requests, so `handle` takes
/// `&self`; per-request state belongs on the carrier.
///
/// # Invariants
///
/// - A stage may read only capabilities it lists in [`Stage::requires`]
///   (or that it checks for optionally with `Carrier::get`)
/// - A stage must layer a value for every capability in [`Stage::provides`]
///   before calling `next`
/// - `next` runs at most once; `Next::run` consumes it
pub trait Stage: Send + Sync + 'static {
    /// Name used in logs and validation errors.
    fn name(&self) -> &str;

    /// Capabilities this stage establishes for stages after it.
    fn provides(&self) -> CapabilitySet {
        CapabilitySet::new()
    }

    /// Capabilities that must be established before this stage runs.
    fn requires(&self) -> CapabilitySet {
        CapabilitySet::new()
    }

    /// Handles the request, usually by calling `next.run(...)`.
    fn handle<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult>;
}

/// A shared, type-erased stage.
pub type BoxedStage = Arc<dyn Stage>;

/// The terminal handler at the end of a chain.
pub trait Handler: Send + Sync + 'static {
    /// Produces the response.
    fn call<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
    ) -> BoxFuture<'a, StageResult>;
}

/// The remainder of a chain.
///
/// Holds a slice of the pipeline's immutable stage list and what follows it,
/// so running a chain allocates nothing per stage.
pub struct Next<'a> {
    stages: &'a [BoxedStage],
    tail: Tail<'a>,
}

enum Tail<'a> {
    Handler(&'a dyn Handler),
    Resume(Box<Next<'a>>),
}

impl<'a> Next<'a> {
    /// Creates a chain over `stages` ending at `handler`.
    pub(crate) fn new(stages: &'a [BoxedStage], handler: &'a dyn Handler) -> Self {
        Self {
            stages,
            tail: Tail::Handler(handler),
        }
    }

    /// Creates a chain over `stages` that continues with `outer` when done.
    ///
    /// Used by nested pipelines: the inner stages run, then the enclosing
    /// chain resumes where it left off.
    pub(crate) fn resume(stages: &'a [BoxedStage], outer: Next<'a>) -> Self {
        Self {
            stages,
            tail: Tail::Resume(Box::new(outer)),
        }
    }

    /// Number of stages left before the tail at this nesting level.
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }

    /// Runs the next stage, or the handler if no stages remain.
    ///
    /// Consumes `self`, so the rest of the chain runs at most once.
    pub fn run<'b>(
        self,
        carrier: Carrier,
        request: &'b Request,
        sink: &'b mut ResponseSink,
    ) -> BoxFuture<'b, StageResult>
    where
        'a: 'b,
    {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    tail: self.tail,
                };
                stage.handle(carrier, request, sink, next)
            }
            None => match self.tail {
                Tail::Handler(handler) => handler.call(carrier, request, sink),
                Tail::Resume(outer) => (*outer).run(carrier, request, sink),
            },
        }
    }
}

/// A stage built from a closure.
///
/// Declares no capabilities unless given some with
/// [`FnStage::with_provides`] or [`FnStage::with_requires`].
///
/// # Example
///
/// ```
/// use ctxware_middleware::stage_fn;
///
/// let timing = stage_fn("timing", |carrier, request, sink, next| {
///     Box::pin(async move {
///         let started = std::time::Instant::now();
///         let result = next.run(carrier, request, sink).await;
///         tracing::debug!(elapsed = ?started.elapsed(), "request timed");
///         result
///     })
/// });
/// ```
pub struct FnStage<F> {
    name: String,
    provides: CapabilitySet,
    requires: CapabilitySet,
    func: F,
}

impl<F> FnStage<F>
where
    F: for<'a> Fn(Carrier, &'a Request, &'a mut ResponseSink, Next<'a>) -> BoxFuture<'a, StageResult>
        + Send
        + Sync
        + 'static,
{
    /// Creates a stage that declares nothing.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            provides: CapabilitySet::new(),
            requires: CapabilitySet::new(),
            func,
        }
    }

    /// Declares the capabilities the closure establishes.
    pub fn with_provides(mut self, provides: CapabilitySet) -> Self {
        self.provides = provides;
        self
    }

    /// Declares the capabilities the closure reads.
    pub fn with_requires(mut self, requires: CapabilitySet) -> Self {
        self.requires = requires;
        self
    }
}

impl<F> Stage for FnStage<F>
where
    F: for<'a> Fn(Carrier, &'a Request, &'a mut ResponseSink, Next<'a>) -> BoxFuture<'a, StageResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self) -> CapabilitySet {
        self.provides.clone()
    }

    fn requires(&self) -> CapabilitySet {
        self.requires.clone()
    }

    fn handle<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        (self.func)(carrier, request, sink, next)
    }
}

/// Wraps a closure as a stage with no declared capabilities.
pub fn stage_fn<F>(name: impl Into<String>, func: F) -> FnStage<F>
where
    F: for<'a> Fn(Carrier, &'a Request, &'a mut ResponseSink, Next<'a>) -> BoxFuture<'a, StageResult>
        + Send
        + Sync
        + 'static,
{
    FnStage::new(name, func)
}

/// A terminal handler built from a closure.
pub struct FnHandler<F> {
    func: F,
}

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(Carrier, &'a Request, &'a mut ResponseSink) -> BoxFuture<'a, StageResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
    ) -> BoxFuture<'a, StageResult> {
        (self.func)(carrier, request, sink)
    }
}

/// Wraps a closure as a terminal handler.
///
/// ```
/// use ctxware_middleware::handler_fn;
///
/// let hello = handler_fn(|_carrier, _request, sink| {
///     Box::pin(async move {
///         sink.write("hello");
///         Ok(())
///     })
/// });
/// ```
pub fn handler_fn<F>(func: F) -> FnHandler<F>
where
    F: for<'a> Fn(Carrier, &'a Request, &'a mut ResponseSink) -> BoxFuture<'a, StageResult>
        + Send
        + Sync
        + 'static,
{
    FnHandler { func }
}
