//! Validated stage pipelines.
//!
//! A [`Pipeline`] is an ordered list of stages whose capability
//! dependencies have been checked. The only ways to obtain one validate the
//! list first, so every `Pipeline` value is sound:
//!
//! - [`Pipeline::builder`] / [`Pipeline::compose`] build a new pipeline
//! - [`Pipeline::append`] / [`Pipeline::prepend`] re-validate a longer list
//! - [`Pipeline::with`] nests the pipeline as one composite stage
//!
//! Stages run outer to inner in declared order, and results unwind inner to
//! outer:
//!
//! ```text
//! request  → A → B → C → handler
//! response ← A ← B ← C ←─┘
//! ```
//!
//! # Example
//!
//! ```
//! use ctxware_middleware::stages::RequestIdStage;
//! use ctxware_middleware::{handler_fn, Pipeline};
//!
//! let endpoint = Pipeline::builder()
//!     .stage(RequestIdStage::new())
//!     .build()
//!     .expect("dependencies satisfied")
//!     .then(handler_fn(|_carrier, _request, sink| {
//!         Box::pin(async move {
//!             sink.write("ok");
//!             Ok(())
//!         })
//!     }));
//! assert_eq!(endpoint.stage_names(), vec!["request_id"]);
//! ```

use std::sync::Arc;

use ctxware_core::{Capability, CapabilitySet, Carrier, StageResult, Tag};

use crate::boundary::Endpoint;
use crate::registry::{validate, DependencyError};
use crate::sink::ResponseSink;
use crate::stage::{BoxedStage, Handler, Next, Stage};
use crate::types::{BoxFuture, Request};

const DEFAULT_NAME: &str = "pipeline";

/// An immutable, dependency-checked list of stages.
///
/// Cloning shares the stage list.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    stages: Arc<[BoxedStage]>,
    base: CapabilitySet,
    provides: CapabilitySet,
    established: CapabilitySet,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Validates `stages` against an empty base set.
    pub fn compose<I>(stages: I) -> Result<Self, DependencyError>
    where
        I: IntoIterator<Item = BoxedStage>,
    {
        Self::from_parts(DEFAULT_NAME.to_string(), stages.into_iter().collect(), CapabilitySet::new())
    }

    fn from_parts(
        name: String,
        stages: Vec<BoxedStage>,
        base: CapabilitySet,
    ) -> Result<Self, DependencyError> {
        let established = validate(&stages, &base)?;
        let provides = stages
            .iter()
            .fold(CapabilitySet::new(), |acc, stage| acc.union(&stage.provides()));

        tracing::debug!(
            pipeline = %name,
            stages = stages.len(),
            provides = %provides,
            "pipeline composed"
        );

        Ok(Self {
            name,
            stages: stages.into(),
            base,
            provides,
            established,
        })
    }

    /// Returns a pipeline running `stages` after this pipeline's stages.
    pub fn append<I>(&self, stages: I) -> Result<Self, DependencyError>
    where
        I: IntoIterator<Item = BoxedStage>,
    {
        let combined = self.stages.iter().cloned().chain(stages).collect();
        Self::from_parts(self.name.clone(), combined, self.base.clone())
    }

    /// Returns a pipeline running `stages` before this pipeline's stages.
    pub fn prepend<I>(&self, stages: I) -> Result<Self, DependencyError>
    where
        I: IntoIterator<Item = BoxedStage>,
    {
        let combined = stages.into_iter().chain(self.stages.iter().cloned()).collect();
        Self::from_parts(self.name.clone(), combined, self.base.clone())
    }

    /// Returns a pipeline whose first stage is this pipeline as a composite,
    /// followed by `stages`.
    pub fn with<I>(&self, stages: I) -> Result<Self, DependencyError>
    where
        I: IntoIterator<Item = BoxedStage>,
    {
        let composite: BoxedStage = Arc::new(self.clone());
        let combined = std::iter::once(composite).chain(stages).collect();
        Self::from_parts(self.name.clone(), combined, self.base.clone())
    }

    /// Attaches the terminal handler and the default error boundary.
    pub fn then<H: Handler>(&self, handler: H) -> Endpoint {
        Endpoint::new(self.clone(), Arc::new(handler))
    }

    /// Returns the pipeline's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the names of the stages in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of top-level stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Capabilities the pipeline assumes are already established.
    pub fn base(&self) -> &CapabilitySet {
        &self.base
    }

    /// The union of every stage's provides.
    pub fn provided(&self) -> &CapabilitySet {
        &self.provides
    }

    /// Everything established after the last stage: base plus provides.
    pub fn established(&self) -> &CapabilitySet {
        &self.established
    }

    pub(crate) fn stages(&self) -> &[BoxedStage] {
        &self.stages
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("base", &self.base.to_string())
            .field("provides", &self.provides.to_string())
            .finish()
    }
}

/// A composed pipeline behaves as a single stage: it provides the union of
/// its stages' provides and requires the base set it was validated against.
impl Stage for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self) -> CapabilitySet {
        self.provides.clone()
    }

    fn requires(&self) -> CapabilitySet {
        self.base.clone()
    }

    fn handle<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Next::resume(&self.stages, next).run(carrier, request, sink)
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    name: Option<String>,
    stages: Vec<BoxedStage>,
    base: CapabilitySet,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the pipeline, for logs and for use as a composite stage.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a stage.
    pub fn stage<S: Stage>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends an already shared stage.
    pub fn boxed_stage(mut self, stage: BoxedStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Declares capability `C` as established before the first stage.
    ///
    /// The transport adapter must seed the carrier with it.
    pub fn assume<C: Capability>(self) -> Self {
        self.assume_tag(Tag::of::<C>())
    }

    /// Declares `tag` as established before the first stage.
    pub fn assume_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.base.insert(tag);
        self
    }

    /// Declares every tag of `tags` as established before the first stage.
    pub fn assume_all(mut self, tags: &CapabilitySet) -> Self {
        self.base.extend_from(tags);
        self
    }

    /// Validates the stages and builds the pipeline.
    pub fn build(self) -> Result<Pipeline, DependencyError> {
        Pipeline::from_parts(
            self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            self.stages,
            self.base,
        )
    }
}
