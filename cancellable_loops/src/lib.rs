//! # cancellable_loops
//!
//! A small utility crate for loops that can be stopped cooperatively from another thread.
//!
//! The cancellation signal is a shared atomic flag. Loops only look at it between two
//! items, never while an item is being processed, so the worst-case latency after a
//! request is the cost of one loop body. This is what long-running iterative numerical
//! work needs:
//!
//! - the body always runs to completion, leaving its output in a consistent state
//! - the caller learns whether the loop completed, was cancelled, or was stopped by
//!   the body itself
//! - the item that would have run next is handed back on cancellation
//!
//! ## Example
//!
//! ```
//! use std::ops::ControlFlow;
//! use cancellable_loops::{for_each_cancellable, CancelFlag, LoopExit};
//!
//! let cancel = CancelFlag::new();
//! let handle = cancel.clone();
//! let mut done = Vec::new();
//!
//! let exit: LoopExit<usize, ()> = for_each_cancellable(1..=10, cancel.as_atomic(), |i| {
//!     done.push(i);
//!     if i == 3 {
//!         // e.g. a user pressing "abort" while iteration 3 runs
//!         handle.request();
//!     }
//!     ControlFlow::Continue(())
//! });
//!
//! assert_eq!(done, vec![1, 2, 3]);
//! assert_eq!(exit, LoopExit::Cancelled { pending: 4 });
//! ```

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared abort flag.
///
/// Cloning the flag yields another handle to the same underlying atomic, so one clone
/// can be moved into a worker thread while another stays with the caller.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Creates a flag in the "not requested" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`CancelFlag::request`] has been called and the flag was not
    /// cleared since.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Resets the flag so that the same handle can drive another loop.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }

    /// Borrow the raw atomic, for APIs that take `&AtomicBool`.
    pub fn as_atomic(&self) -> &AtomicBool {
        &self.flag
    }
}

/// How a call to [`for_each_cancellable`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit<T, B> {
    /// Every item was processed.
    Completed,
    /// The abort flag was seen before `pending` started.
    Cancelled { pending: T },
    /// The loop body returned [`ControlFlow::Break`].
    Stopped(B),
}

impl<T, B> LoopExit<T, B> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopExit::Cancelled { .. })
    }
}

/// Executes a sequential loop that can be cancelled via an abort flag.
///
/// The flag is checked at the top of every iteration. An item whose body already
/// started is never interrupted. The body may end the loop early by returning
/// [`ControlFlow::Break`], e.g. when a convergence criterion is met or a stage fails.
///
/// # Arguments
///
/// * `iter` - Any iterator to process
/// * `abort_flag` - An atomic boolean that can be set to `true` to cancel the loop
/// * `func` - The loop body
///
/// # Examples
///
/// ```
/// use std::ops::ControlFlow;
/// use std::sync::atomic::AtomicBool;
/// use cancellable_loops::{for_each_cancellable, LoopExit};
///
/// let abort_flag = AtomicBool::new(false);
/// let mut sum = 0;
///
/// let exit = for_each_cancellable(1..=10, &abort_flag, |i| {
///     sum += i;
///     if sum > 15 {
///         return ControlFlow::Break(i);
///     }
///     ControlFlow::Continue(())
/// });
///
/// // 1+2+3+4+5+6 = 21 is the first partial sum above 15
/// assert_eq!(exit, LoopExit::Stopped(6));
/// assert_eq!(sum, 21);
/// ```
pub fn for_each_cancellable<I, F, T, B>(iter: I, abort_flag: &AtomicBool, mut func: F) -> LoopExit<T, B>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> ControlFlow<B>,
{
    for item in iter {
        if abort_flag.load(Ordering::Relaxed) {
            return LoopExit::Cancelled { pending: item };
        }
        if let ControlFlow::Break(reason) = func(item) {
            return LoopExit::Stopped(reason);
        }
    }
    LoopExit::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_completes_without_request() {
        let cancel = CancelFlag::new();
        let mut seen = 0;
        let exit: LoopExit<usize, ()> = for_each_cancellable(0..5, cancel.as_atomic(), |_| {
            seen += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(exit, LoopExit::Completed);
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_request_before_start_runs_nothing() {
        let cancel = CancelFlag::new();
        cancel.request();
        let mut seen = 0;
        let exit: LoopExit<usize, ()> = for_each_cancellable(7..9, cancel.as_atomic(), |_| {
            seen += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(exit, LoopExit::Cancelled { pending: 7 });
        assert_eq!(seen, 0);
    }

    #[test]
    fn test_clear_rearms_flag() {
        let cancel = CancelFlag::new();
        let other = cancel.clone();
        other.request();
        assert!(cancel.is_requested());
        cancel.clear();
        assert!(!other.is_requested());
    }
}
