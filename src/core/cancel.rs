//! Cooperative cancellation and deadlines
//!
//! Solvers check these at every outer iteration. Cancellation aborts the
//! solve with no state mutated; a deadline lets the solve finish with its
//! best feasible iterate, flagged as timed out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag.
///
/// Cloning the token shares the underlying flag, so a caller can hold one
/// clone while a solve holds another.
///
/// # Example
/// ```
/// use arbitration_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// assert!(!observer.is_cancelled());
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Optional wall-clock deadline for a solve.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No deadline: the solve runs to convergence or its iteration cap.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
        }
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

/// What interrupted a solve, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExpired,
}

/// Cancellation token and deadline bundled for passing into solvers.
#[derive(Debug, Clone, Default)]
pub struct SolveLimits {
    pub cancel: CancellationToken,
    pub deadline: Deadline,
}

impl SolveLimits {
    /// Limits that never interrupt.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limits carrying only a deadline.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Deadline::after(budget),
        }
    }

    /// Poll for an interrupt. Cancellation wins over deadline expiry so a
    /// cancelled solve never mutates state just because it was also slow.
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.cancel.is_cancelled() {
            Some(Interrupt::Cancelled)
        } else if self.deadline.expired() {
            Some(Interrupt::DeadlineExpired)
        } else {
            None
        }
    }
}
