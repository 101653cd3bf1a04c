//! Wait queue
//!
//! A single wait condition ("data available", "space available", ...) that
//! tasks sleep on and that the opposite party wakes.
//!
//! # Avoiding lost wakeups
//!
//! The naive workflow is:
//!
//! 10. Sleeper: lock the device, check the predicate, unlock
//! 20. Sleeper: add itself to the queue and suspend
//!
//! 30. Waker: lock the device, change the state, wake the queue, unlock
//!
//! If step 30 runs between 10 and 20, the sleeper misses the wakeup and may
//! sleep forever. To close the window the sleeper registers *before* it
//! releases the device lock:
//!
//! ```ignore
//! // device lock held, predicate says "wait"
//! let waiter = queue.register("reader");
//! drop(guard);
//! waiter.await;
//! // re-acquire the lock and check the predicate again
//! ```
//!
//! Any waker that changes the state has to take the device lock first, so it
//! either ran before the check (and the sleeper will not sleep) or runs after
//! the registration (and finds the sleeper in the queue).
//!
//! Waking releases every registered waiter. The order in which they then
//! re-acquire the device lock is unspecified, and each must re-check its
//! predicate.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A sleeper registered on the queue
struct WaitingClient {
    sender: oneshot::Sender<()>,
    debug_hint: &'static str,
}

impl std::fmt::Debug for WaitingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingClient")
            .field("debug_hint", &self.debug_hint)
            .finish_non_exhaustive()
    }
}

pub struct WaitQueue {
    name: &'static str,
    waiters: Mutex<Vec<WaitingClient>>,
}

/// Future side of a registration, resolved by [`WaitQueue::wake_all`]
pub struct Waiter {
    receiver: oneshot::Receiver<()>,
}

impl Waiter {
    /// Suspend until woken
    pub async fn wait(self) {
        // A dropped sender means the queue itself is gone; there is nothing
        // left to wait for, so resolve as if woken.
        let _ = self.receiver.await;
    }
}

impl WaitQueue {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Add a sleeper; call with the device lock held
    ///
    /// Registrations whose waiter was dropped (an interrupted sleep) are
    /// pruned first, so the queue stays bounded by the live sleepers.
    #[must_use]
    pub fn register(&self, debug_hint: &'static str) -> Waiter {
        let (sender, receiver) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        waiters.retain(|w| !w.sender.is_closed());
        waiters.push(WaitingClient { sender, debug_hint });
        Waiter { receiver }
    }

    /// Wake every registered sleeper, returns how many were still waiting
    pub fn wake_all(&self) -> usize {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        let total = waiters.len();
        let mut woken = 0;
        for waiter in waiters {
            if waiter.sender.send(()).is_ok() {
                woken += 1;
            } else {
                log::debug!(
                    "queue {}: waiter '{}' gave up before the wakeup",
                    self.name,
                    waiter.debug_hint
                );
            }
        }
        if total > 0 {
            log::debug!("queue {}: woke {woken} of {total} waiters", self.name);
        }
        woken
    }

    /// Number of registrations not yet woken (abandoned ones until pruned)
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitQueue")
            .field("name", &self.name)
            .field("waiters", &self.waiters.lock().len())
            .finish()
    }
}
