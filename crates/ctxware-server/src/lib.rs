//! hyper-based transport for ctxware endpoints.
//!
//! [`Server`] owns the socket side of a service: it accepts connections,
//! turns each HTTP request into a buffered [`ctxware_middleware::Request`],
//! seeds the carrier with the remote address and lets the endpoint's error
//! boundary produce the response.
//!
//! ```rust,ignore
//! use ctxware_server::{Server, ShutdownSignal};
//!
//! let shutdown = ShutdownSignal::with_os_signals();
//! Server::new(config.server, endpoint)?
//!     .run_with_shutdown(shutdown)
//!     .await?;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod server;
pub mod shutdown;

pub use error::ServerError;
pub use server::{transport_capabilities, Server};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
