//! Cancellation tokens shared between the scheduler and running transfers.
//!
//! The scheduler keeps one token per in-flight upload; the transfer polls it
//! from its progress callback and stops as soon as it is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable abort flag. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns true only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
