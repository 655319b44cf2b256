//! Built-in stages.
//!
//! | Stage | Provides | Requires |
//! |---|---|---|
//! | [`RequestIdStage`] | `ctxware.request_id` | - |
//! | [`RequestLogStage`] | - | - |
//! | [`ConcurrencyLimitStage`] | - | `transport.remote_addr` |
//!
//! Closures become stages with [`stage_fn`](crate::stage_fn).

pub mod limit;
pub mod logging;
pub mod request_id;

pub use limit::{ConcurrencyLimitStage, LimitConfig, Permit};
pub use logging::{RequestLogConfig, RequestLogStage};
pub use request_id::{RequestIdStage, REQUEST_ID_HEADER};
