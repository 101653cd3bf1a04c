//! Pipe device: a bounded ring with blocking producer/consumer access
//!
//! Readers sleep on `readable` ("data available") while the ring is empty;
//! writers sleep on `writable` ("space available") while it is full. Each
//! successful non-empty transfer wakes the opposite queue.
//!
//! # Thread Safety
//!
//! - All ring state is behind one [`BlockingGate`]. The gate is released
//!   before sleeping and re-acquired before the predicate is re-checked.
//! - Wakeups are sent after the gate is released. A sleeper registers under
//!   the gate, so it is either visible to the waker or it re-checks a state
//!   the waker already changed. See [`crate::wait_queue`].
//! - Blocking and non-blocking callers can share one device; the mode is a
//!   per-call argument.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::gate::{Blocking, BlockingGate};
use crate::io::{UserSink, UserSource};
use crate::ring::{RingBuffer, Sides};
use crate::wait_queue::WaitQueue;

/// Poll result for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

pub struct PipeDevice {
    index: usize,
    gate: BlockingGate<RingBuffer>,
    readable: WaitQueue,
    writable: WaitQueue,
}

impl PipeDevice {
    #[must_use]
    pub fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            gate: BlockingGate::new(RingBuffer::new(capacity)),
            readable: WaitQueue::new("data available"),
            writable: WaitQueue::new("space available"),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Activate the ring if needed and count the handle
    ///
    /// # Errors
    ///
    /// `Interrupted`, or `OutOfMemory` if the ring cannot be allocated. The
    /// gate is released on every path.
    pub async fn open(&self, sides: Sides, cancel: &CancellationToken) -> Result<()> {
        let mut ring = self.gate.lock(cancel).await?;
        ring.activate(sides)?;
        log::debug!("scullpipe{}: opened, {ring:?}", self.index);
        Ok(())
    }

    /// Uncount a handle; the last one discards the contents
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock; counts are
    /// unchanged in that case.
    pub async fn release(&self, sides: Sides, cancel: &CancellationToken) -> Result<()> {
        let mut ring = self.gate.lock(cancel).await?;
        self.deactivate(&mut ring, sides);
        Ok(())
    }

    pub(crate) async fn release_uninterruptible(&self, sides: Sides) {
        let mut ring = self.gate.lock_uninterruptible().await;
        self.deactivate(&mut ring, sides);
    }

    /// Release without waiting; `false` if the gate is busy
    pub(crate) fn try_release(&self, sides: Sides) -> bool {
        match self.gate.try_lock() {
            Some(mut ring) => {
                self.deactivate(&mut ring, sides);
                true
            }
            None => false,
        }
    }

    /// Release from outside an async runtime
    pub(crate) fn release_blocking(&self, sides: Sides) {
        let mut ring = self.gate.blocking_lock();
        self.deactivate(&mut ring, sides);
    }

    fn deactivate(&self, ring: &mut RingBuffer, sides: Sides) {
        if ring.deactivate(sides) {
            log::debug!(
                "scullpipe{}: last handle closed, contents discarded",
                self.index
            );
        }
    }

    /// Read up to `buf.len()` bytes, sleeping while the ring is empty.
    ///
    /// A single call never reads past the physical end of the ring.
    ///
    /// # Errors
    ///
    /// - `WouldBlock` if empty and `mode` is non-blocking.
    /// - `Interrupted` if cancelled while waiting.
    /// - `Fault` if the copy fails; nothing is consumed.
    pub async fn read<S>(
        &self,
        buf: &mut S,
        mode: Blocking,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        S: UserSink + ?Sized,
    {
        let ring = self.gate.lock(cancel).await?;
        let mut ring = self
            .gate
            .wait_while(ring, &self.readable, "pipe reader", mode, cancel, RingBuffer::is_empty)
            .await?;
        let n = ring.read_into(buf)?;
        drop(ring);

        log::debug!(
            "scullpipe{}: reader read {n} bytes and wakes up writers",
            self.index
        );
        if n > 0 {
            self.writable.wake_all();
        }
        Ok(n)
    }

    /// Write up to `src.len()` bytes, sleeping while the ring is full.
    ///
    /// A single call never writes past the physical end of the ring nor into
    /// the reserved slot.
    ///
    /// # Errors
    ///
    /// - `WouldBlock` if full and `mode` is non-blocking.
    /// - `Interrupted` if cancelled while waiting.
    /// - `Fault` if the copy fails; nothing is produced.
    pub async fn write<S>(
        &self,
        src: &S,
        mode: Blocking,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        S: UserSource + ?Sized,
    {
        let ring = self.gate.lock(cancel).await?;
        let mut ring = self
            .gate
            .wait_while(ring, &self.writable, "pipe writer", mode, cancel, |r| {
                r.free_space() == 0
            })
            .await?;
        let n = ring.write_from(src)?;
        drop(ring);

        log::debug!(
            "scullpipe{}: writer wrote {n} bytes and wakes up readers",
            self.index
        );
        if n > 0 {
            self.readable.wake_all();
        }
        Ok(n)
    }

    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock.
    pub async fn poll(&self, cancel: &CancellationToken) -> Result<Readiness> {
        let ring = self.gate.lock(cancel).await?;
        Ok(Readiness {
            readable: ring.is_active() && !ring.is_empty(),
            writable: ring.is_active() && ring.free_space() > 0,
        })
    }

    /// Bytes currently buffered
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock.
    pub async fn buffered(&self, cancel: &CancellationToken) -> Result<usize> {
        Ok(self.gate.lock(cancel).await?.used())
    }

    /// Whether the ring array is currently allocated
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock.
    pub async fn is_active(&self, cancel: &CancellationToken) -> Result<bool> {
        Ok(self.gate.lock(cancel).await?.is_active())
    }
}

impl std::fmt::Debug for PipeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeDevice")
            .field("index", &self.index)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}
