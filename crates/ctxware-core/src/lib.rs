//! # ctxware core
//!
//! Foundational types shared by every ctxware crate:
//!
//! - [`Tag`] and [`CapabilitySet`] - capability declarations
//! - [`Capability`] - typed accessor pairing a tag with its value type
//! - [`Carrier`] - immutable, layered request-scoped values
//! - [`Failure`] and [`StageError`] - classified and unclassified errors
//! - [`RequestId`] - UUID v7 request identifier
//!
//! Built-in capabilities are [`RequestIdKey`] and [`RemoteAddrKey`].

#![doc(html_root_url = "https://docs.rs/ctxware-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod capability;
mod carrier;
mod error;
mod request_id;

pub use capability::{Capability, CapabilitySet, RemoteAddrKey, RequestIdKey, Tag};
pub use carrier::Carrier;
pub use error::{canonical_message, Failure, FailureBody, StageError, StageResult};
pub use request_id::RequestId;
