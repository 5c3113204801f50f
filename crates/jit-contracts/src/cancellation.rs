//! Cooperative cancellation signal threaded through every blocking outbound
//! call (§5 "Cancellation", §9 "Replacing per-request dependency injection
//! scopes" — passed as an explicit argument rather than carried on an
//! implicit per-request scope).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply-cloneable flag a caller can flip to signal that the in-flight
/// request should abort. Outbound adapters are expected to check it
/// between retries and before starting new blocking work; this crate's
/// reference implementations check it but never spawn the polling thread
/// that would trip it in production (that belongs to the out-of-scope
/// REST façade).
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}
