//! Load generation tokens
//!
//! Every load attempt takes a fresh token from a shared [`LoadGeneration`].
//! Work holding a token that is no longer current must drop its results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque token identifying one load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadToken(u64);

impl LoadToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Shared monotonic generation counter
#[derive(Debug, Clone, Default)]
pub struct LoadGeneration {
    current: Arc<AtomicU64>,
}

impl LoadGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt, invalidating every outstanding token
    pub fn advance(&self) -> LoadToken {
        LoadToken(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Invalidate outstanding tokens without starting a new load
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        self.current.load(Ordering::Acquire) == token.0
    }
}
