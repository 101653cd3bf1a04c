//! Blocking gate
//!
//! One gate guards all mutable state of one device. It combines:
//!
//! - an async mutex whose acquisition can be cancelled, and
//! - a wait primitive that releases the mutex, sleeps on a [`WaitQueue`]
//!   and re-acquires the mutex, also cancellable.
//!
//! The lock is never held while sleeping. Cancellation is cooperative: the
//! caller passes a `CancellationToken`, and a cancelled token aborts the
//! current acquisition or sleep with [`ScullError::Interrupted`]. The
//! operation is not partially completed; the caller retries it.

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ScullError};
use crate::wait_queue::WaitQueue;

/// Whether a call may sleep when it cannot proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blocking {
    #[default]
    Block,
    NonBlock,
}

impl Blocking {
    #[must_use]
    pub fn from_nonblocking(nonblocking: bool) -> Self {
        if nonblocking {
            Self::NonBlock
        } else {
            Self::Block
        }
    }
}

pub struct BlockingGate<T> {
    state: Mutex<T>,
}

impl<T> BlockingGate<T> {
    #[must_use]
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Acquire the lock unless `cancel` fires first
    ///
    /// # Errors
    ///
    /// `Interrupted` if the token is (or becomes) cancelled.
    pub async fn lock(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, T>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScullError::Interrupted),
            guard = self.state.lock() => Ok(guard),
        }
    }

    /// Acquire the lock, ignoring cancellation
    ///
    /// Only for release paths that must run to completion.
    pub async fn lock_uninterruptible(&self) -> MutexGuard<'_, T> {
        self.state.lock().await
    }

    /// Acquire the lock only if nobody holds it
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.state.try_lock().ok()
    }

    /// Acquire the lock from outside any async runtime
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_lock(&self) -> MutexGuard<'_, T> {
        self.state.blocking_lock()
    }

    /// Release `guard`, sleep on `queue`, re-acquire.
    ///
    /// The registration happens before the release, so a wakeup issued by
    /// anyone who takes the lock afterwards cannot be missed.
    ///
    /// # Errors
    ///
    /// `Interrupted` if `cancel` fires while asleep or while re-acquiring.
    pub async fn wait<'a>(
        &'a self,
        guard: MutexGuard<'a, T>,
        queue: &WaitQueue,
        debug_hint: &'static str,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard<'a, T>> {
        let waiter = queue.register(debug_hint);
        drop(guard);

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ScullError::Interrupted),
            () = waiter.wait() => {}
        }
        self.lock(cancel).await
    }

    /// Sleep on `queue` for as long as `blocked` holds.
    ///
    /// Returns the guard with `blocked` false. Spurious wakeups simply loop.
    ///
    /// # Errors
    ///
    /// - `WouldBlock` if `blocked` holds and `mode` is non-blocking.
    /// - `Interrupted` if `cancel` fires.
    pub async fn wait_while<'a, F>(
        &'a self,
        mut guard: MutexGuard<'a, T>,
        queue: &WaitQueue,
        debug_hint: &'static str,
        mode: Blocking,
        cancel: &CancellationToken,
        blocked: F,
    ) -> Result<MutexGuard<'a, T>>
    where
        F: Fn(&T) -> bool,
    {
        while blocked(&*guard) {
            if mode == Blocking::NonBlock {
                return Err(ScullError::WouldBlock);
            }
            log::debug!("{debug_hint} is about to sleep");
            guard = self.wait(guard, queue, debug_hint, cancel).await?;
        }
        Ok(guard)
    }
}
