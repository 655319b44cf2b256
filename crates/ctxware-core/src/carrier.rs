//! The request-scoped value carrier.
//!
//! A [`Carrier`] is a persistent stack of layers. Providing a capability
//! returns a new carrier with one layer on top and leaves the receiver
//! untouched, so a stage can hand a richer carrier downstream while the
//! carrier it was given stays exactly as it was. Lookups walk from the newest
//! layer, so a later layer shadows an earlier one for the same capability.
//!
//! Cloning is a reference-count bump; carriers are cheap to pass by value.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::capability::{Capability, CapabilitySet, Tag};
use crate::error::StageError;

struct Layer {
    tag: Tag,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Layer>>,
}

/// Immutable overlay of capability values for a single request.
///
/// # Example
///
/// ```
/// use ctxware_core::{Capability, Carrier};
///
/// struct UserKey;
///
/// impl Capability for UserKey {
///     const TAG: &'static str = "app.user";
///     type Value = String;
/// }
///
/// let base = Carrier::new();
/// let with_user = base.provide::<UserKey>("ada".to_string());
///
/// assert_eq!(with_user.get::<UserKey>().map(String::as_str), Some("ada"));
/// assert!(base.get::<UserKey>().is_none());
/// ```
#[derive(Clone, Default)]
pub struct Carrier {
    head: Option<Arc<Layer>>,
}

impl Carrier {
    /// Creates an empty carrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new carrier with `value` layered on top for capability `C`.
    #[must_use]
    pub fn provide<C: Capability>(&self, value: C::Value) -> Self {
        Self {
            head: Some(Arc::new(Layer {
                tag: Tag::of::<C>(),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Returns the newest value provided under `C::TAG`.
    ///
    /// Returns `None` if that value is not a `C::Value`.
    #[must_use]
    pub fn get<C: Capability>(&self) -> Option<&C::Value> {
        self.layers()
            .find(|layer| layer.tag.as_str() == C::TAG)
            .and_then(|layer| layer.value.downcast_ref::<C::Value>())
    }

    /// Returns the value for capability `C` or an unclassified error.
    ///
    /// Use this for capabilities a stage declared in its requirements; a
    /// miss means the value was never layered despite validation passing,
    /// which is a programming error rather than a client error.
    pub fn require<C: Capability>(&self) -> Result<&C::Value, StageError> {
        self.get::<C>().ok_or_else(|| {
            StageError::Unclassified(anyhow::anyhow!(
                "capability '{}' is not present on the carrier",
                C::TAG
            ))
        })
    }

    /// Returns `true` if a value for capability `C` has been provided.
    #[must_use]
    pub fn contains<C: Capability>(&self) -> bool {
        self.get::<C>().is_some()
    }

    /// Returns `true` if any layer was provided under `tag`.
    #[must_use]
    pub fn contains_tag(&self, tag: &Tag) -> bool {
        self.layers().any(|layer| &layer.tag == tag)
    }

    /// Returns the set of tags established on this carrier.
    #[must_use]
    pub fn tags(&self) -> CapabilitySet {
        self.layers().map(|layer| layer.tag.clone()).collect()
    }

    /// Returns the number of layers, counting shadowed ones.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers().count()
    }

    fn layers(&self) -> impl Iterator<Item = &Layer> {
        std::iter::successors(self.head.as_deref(), |layer| layer.parent.as_deref())
    }
}

impl fmt::Debug for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Carrier")
            .field("tags", &self.tags().to_string())
            .field("depth", &self.depth())
            .finish()
    }
}
