//! Bounded circular byte buffer
//!
//! `read == write` means empty. One slot always stays unused so that a full
//! buffer (`write` one behind `read`) is distinguishable from an empty one;
//! the usable capacity is `capacity - 1`.
//!
//! The backing array is absent until the first open and is freed again when
//! the last reader and the last writer are gone. Fullness and emptiness are
//! derived from the cursors on every call, never stored.
//!
//! Like the store, the ring does no locking and never blocks. Waiting for
//! data or space is the device's business.

use crate::error::Result;
use crate::io::{UserSink, UserSource};

/// Which sides of the buffer an open handle counts towards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sides {
    pub reader: bool,
    pub writer: bool,
}

pub struct RingBuffer {
    capacity: usize,
    storage: Option<Box<[u8]>>,
    read: usize,
    write: usize,
    readers: usize,
    writers: usize,
}

impl RingBuffer {
    /// Create an inactive ring of `capacity` bytes (`capacity - 1` usable)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            storage: None,
            read: 0,
            write: 0,
            readers: 0,
            writers: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.storage.is_some()
    }

    #[must_use]
    pub fn readers(&self) -> usize {
        self.readers
    }

    #[must_use]
    pub fn writers(&self) -> usize {
        self.writers
    }

    /// Bytes waiting to be read
    #[must_use]
    pub fn used(&self) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        (self.write + self.capacity - self.read) % self.capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Bytes that can be written before the buffer is full
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.capacity.saturating_sub(1) - self.used()
    }

    /// Allocate the array if absent and count the new handle.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the array cannot be allocated; counts are unchanged.
    pub fn activate(&mut self, sides: Sides) -> Result<()> {
        if self.storage.is_none() {
            let mut data = Vec::new();
            data.try_reserve_exact(self.capacity)?;
            data.resize(self.capacity, 0);
            self.storage = Some(data.into_boxed_slice());
            self.read = 0;
            self.write = 0;
        }
        if sides.reader {
            self.readers += 1;
        }
        if sides.writer {
            self.writers += 1;
        }
        Ok(())
    }

    /// Uncount a handle; the last one out discards the contents.
    ///
    /// Returns whether the array was released.
    pub fn deactivate(&mut self, sides: Sides) -> bool {
        if sides.reader {
            self.readers = self.readers.saturating_sub(1);
        }
        if sides.writer {
            self.writers = self.writers.saturating_sub(1);
        }
        if self.readers == 0 && self.writers == 0 && self.storage.is_some() {
            self.storage = None;
            self.read = 0;
            self.write = 0;
            return true;
        }
        false
    }

    /// Consume up to `buf.len()` bytes, never past the physical end.
    ///
    /// Returns 0 only when the buffer is empty or inactive.
    ///
    /// # Errors
    ///
    /// `Fault` if the copy to `buf` fails; the read cursor does not move.
    pub fn read_into<S>(&mut self, buf: &mut S) -> Result<usize>
    where
        S: UserSink + ?Sized,
    {
        let Some(storage) = self.storage.as_deref() else {
            return Ok(0);
        };
        let contiguous = if self.write >= self.read {
            self.write - self.read
        } else {
            self.capacity - self.read
        };
        let count = buf.len().min(contiguous);
        buf.copy_from(&storage[self.read..self.read + count])?;

        self.read += count;
        if self.read == self.capacity {
            self.read = 0;
        }
        Ok(count)
    }

    /// Produce up to `src.len()` bytes, never past the physical end and
    /// never into the reserved slot.
    ///
    /// # Errors
    ///
    /// `Fault` if the copy from `src` fails; the write cursor does not move.
    pub fn write_from<S>(&mut self, src: &S) -> Result<usize>
    where
        S: UserSource + ?Sized,
    {
        let free = self.free_space();
        let (read, write, capacity) = (self.read, self.write, self.capacity);
        let Some(storage) = self.storage.as_deref_mut() else {
            return Ok(0);
        };
        let contiguous = if write >= read {
            capacity - write
        } else {
            read - write - 1
        };
        let count = src.len().min(contiguous).min(free);
        src.copy_into(&mut storage[write..write + count])?;

        self.write += count;
        if self.write == self.capacity {
            self.write = 0;
        }
        Ok(count)
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RingBuffer(capacity={}, active={}, read={}, write={}, readers={}, writers={})",
            self.capacity,
            self.is_active(),
            self.read,
            self.write,
            self.readers,
            self.writers
        )
    }
}
