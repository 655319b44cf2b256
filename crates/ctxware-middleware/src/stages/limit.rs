//! Concurrent request limiting.
//!
//! Caps the number of requests in flight per remote IP and in total. A
//! request over either cap is refused with `429 Too Many Requests` and,
//! when configured, a `Retry-After` header. Counters are held under a short
//! mutex for the increment and the decrement only; an in-flight request
//! holds a [`Permit`] that releases its slot when dropped, including when
//! the request future is cancelled.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use ctxware_core::{CapabilitySet, Carrier, Failure, RemoteAddrKey, StageResult};
use http::header::{HeaderValue, RETRY_AFTER};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::sink::ResponseSink;
use crate::stage::{Next, Stage};
use crate::types::{BoxFuture, Request};

/// Limiter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitConfig {
    /// Requests a single remote IP may have in flight.
    pub remote_limit: usize,
    /// Requests that may be in flight in total.
    pub total_limit: u64,
    /// Value of `Retry-After` on refusal, in seconds; `0` omits the header.
    pub retry_after_secs: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            remote_limit: 100,
            total_limit: 1_000_000,
            retry_after_secs: 3600,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    remotes: HashMap<IpAddr, usize>,
}

/// Stage that limits in-flight requests. Clones share counters.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyLimitStage {
    config: LimitConfig,
    counters: Arc<Mutex<Counters>>,
}

impl ConcurrencyLimitStage {
    /// Creates a limiter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a limiter with the given settings.
    #[must_use]
    pub fn with_config(config: LimitConfig) -> Self {
        Self {
            config,
            counters: Arc::default(),
        }
    }

    /// Returns the settings.
    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    /// Requests currently in flight.
    pub fn total_active(&self) -> u64 {
        self.counters.lock().total
    }

    /// Requests currently in flight from `ip`.
    pub fn remote_active(&self, ip: IpAddr) -> usize {
        self.counters.lock().remotes.get(&ip).copied().unwrap_or(0)
    }

    /// Takes a slot for `ip`, or `None` if a limit is reached.
    pub fn try_acquire(&self, ip: IpAddr) -> Option<Permit> {
        let mut counters = self.counters.lock();
        let active = counters.remotes.get(&ip).copied().unwrap_or(0);
        if active >= self.config.remote_limit || counters.total >= self.config.total_limit {
            return None;
        }
        counters.total += 1;
        *counters.remotes.entry(ip).or_insert(0) += 1;
        drop(counters);

        Some(Permit {
            ip,
            counters: Arc::clone(&self.counters),
        })
    }

    async fn process<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> StageResult {
        let ip = carrier.require::<RemoteAddrKey>()?.ip();

        if let Some(_permit) = self.try_acquire(ip) {
            return next.run(carrier, request, sink).await;
        }

        tracing::warn!(
            remote = %ip,
            remote_limit = self.config.remote_limit,
            total_limit = self.config.total_limit,
            "request refused by concurrency limit"
        );
        if self.config.retry_after_secs > 0 {
            sink.insert_header(RETRY_AFTER, HeaderValue::from(self.config.retry_after_secs))?;
        }
        Err(Failure::too_many_requests("exceeded request rate limit").into())
    }
}

impl Stage for ConcurrencyLimitStage {
    fn name(&self) -> &str {
        "concurrency_limit"
    }

    fn requires(&self) -> CapabilitySet {
        CapabilitySet::of::<RemoteAddrKey>()
    }

    fn handle<'a>(
        &'a self,
        carrier: Carrier,
        request: &'a Request,
        sink: &'a mut ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(self.process(carrier, request, sink, next))
    }
}

/// A held slot; released on drop.
#[derive(Debug)]
pub struct Permit {
    ip: IpAddr,
    counters: Arc<Mutex<Counters>>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut counters = self.counters.lock();
        counters.total = counters.total.saturating_sub(1);
        if let Some(active) = counters.remotes.get_mut(&self.ip) {
            if *active <= 1 {
                counters.remotes.remove(&self.ip);
            } else {
                *active -= 1;
            }
        }
    }
}
