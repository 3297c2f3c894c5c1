//! Cooperative cancellation
//!
//! A run hands one `CancelSignal` to every unit of work. Units poll it at
//! fixed checkpoints (top of the unit, after decode, once per pixel inside the
//! filter loop) and bail out with [`Cancelled`] when it is set. Nothing is
//! interrupted forcibly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Returned by any operation that observed a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation canceled")]
pub struct Cancelled;

/// Shared, cloneable cancellation flag. Written once, read by many.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` if this call flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// True when both handles observe the same flag.
    pub fn same_as(&self, other: &CancelSignal) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }

    /// Checkpoint: `Err(Cancelled)` once the flag is set.
    #[inline]
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
