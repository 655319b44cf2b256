//! Capability tags and capability sets.
//!
//! A capability is a named guarantee about the request-scoped state a stage
//! can rely on, e.g. "the request id is known" or "the caller has been
//! authenticated". Stages declare the tags they *provide* and the tags they
//! *require*; the pipeline validator checks those declarations before a
//! single request is served.
//!
//! Each tag is paired with a [`Capability`] marker type so that stages read
//! and write the associated value without casts:
//!
//! ```
//! use ctxware_core::{Capability, CapabilitySet, Tag};
//!
//! struct TenantKey;
//!
//! impl Capability for TenantKey {
//!     const TAG: &'static str = "app.tenant";
//!     type Value = String;
//! }
//!
//! let set = CapabilitySet::new().with::<TenantKey>();
//! assert!(set.contains(&Tag::of::<TenantKey>()));
//! ```

use std::borrow::Cow;
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;

use crate::request_id::RequestId;

/// An opaque capability identifier, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(Cow<'static, str>);

impl Tag {
    /// Creates a tag from a static string without allocating.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a tag from an owned name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the tag declared by capability `C`.
    #[must_use]
    pub const fn of<C: Capability>() -> Self {
        Self::from_static(C::TAG)
    }

    /// Returns the tag name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Tag {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A typed capability: a tag plus the type of the value it makes available.
///
/// Implemented by zero-sized marker types. The tag is the capability's
/// identity everywhere: validation compares tags and the
/// [`Carrier`](crate::Carrier) looks values up by tag. Two markers that
/// declare the same `TAG` are the same capability, so they must also agree on
/// `Value`; a lookup through a marker whose `Value` does not match the layer
/// under that tag finds nothing.
pub trait Capability: 'static {
    /// The tag this capability is declared under.
    const TAG: &'static str;

    /// The value stages read once the capability is established.
    type Value: Send + Sync + 'static;
}

/// A set of capability tags.
///
/// Iteration order is the tag order, which keeps validation diagnostics
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    tags: BTreeSet<Tag>,
}

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding the tag of capability `C`.
    #[must_use]
    pub fn of<C: Capability>() -> Self {
        Self::new().with::<C>()
    }

    /// Adds the tag of capability `C`.
    #[must_use]
    pub fn with<C: Capability>(self) -> Self {
        self.with_tag(Tag::of::<C>())
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Inserts a tag, returning `false` if it was already present.
    pub fn insert(&mut self, tag: impl Into<Tag>) -> bool {
        self.tags.insert(tag.into())
    }

    /// Returns `true` if the set holds `tag`.
    #[must_use]
    pub fn contains(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Returns `true` if the set holds a tag with the given name.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.as_str() == name)
    }

    /// Adds every tag of `other` to this set.
    pub fn extend_from(&mut self, other: &Self) {
        self.tags.extend(other.tags.iter().cloned());
    }

    /// Returns the union of both sets.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.extend_from(other);
        merged
    }

    /// Returns `true` if every tag of this set is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.tags.is_subset(&other.tags)
    }

    /// Returns the tags of this set that `other` lacks.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            tags: self.tags.difference(&other.tags).cloned().collect(),
        }
    }

    /// Iterates the tags in order.
    pub fn iter(&self) -> btree_set::Iter<'_, Tag> {
        self.tags.iter()
    }

    /// Returns the number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(tag.as_str())?;
        }
        f.write_str("}")
    }
}

impl<T: Into<Tag>> FromIterator<T> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<T: Into<Tag>> Extend<T> for CapabilitySet {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.tags.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for CapabilitySet {
    type Item = Tag;
    type IntoIter = btree_set::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

impl<'a> IntoIterator for &'a CapabilitySet {
    type Item = &'a Tag;
    type IntoIter = btree_set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

/// The per-request identifier, established by the request id stage.
#[derive(Debug, Clone, Copy)]
pub struct RequestIdKey;

impl Capability for RequestIdKey {
    const TAG: &'static str = "ctxware.request_id";
    type Value = RequestId;
}

/// The peer address of the connection, guaranteed by the transport.
#[derive(Debug, Clone, Copy)]
pub struct RemoteAddrKey;

impl Capability for RemoteAddrKey {
    const TAG: &'static str = "transport.remote_addr";
    type Value = SocketAddr;
}
