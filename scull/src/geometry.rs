//! Storage geometry and offset translation
//!
//! A store addresses its byte space through a chain of nodes. Each node
//! holds `qset` blocks of `quantum` bytes, so one node spans
//! `qset * quantum` bytes:
//!
//! ```text
//!  offset ─┬─ / node_span ─────────────────────────▶ node index
//!          └─ % node_span ─┬─ / quantum ───────────▶ slot in node
//!                          └─ % quantum ───────────▶ byte in block
//! ```

use crate::error::{Result, ScullError};

/// Compiled-in bytes per block
pub const SCULL_QUANTUM: usize = 4000;

/// Compiled-in blocks per node
pub const SCULL_QSET: usize = 1000;

/// Block size and node-array length of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    quantum: usize,
    qset: usize,
}

/// Where an absolute offset lands in the node chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub node: usize,
    pub slot: usize,
    pub byte: usize,
}

impl Geometry {
    /// # Errors
    ///
    /// `InvalidArgument` if either tunable is zero or a node span would not
    /// fit in the offset space.
    pub fn new(quantum: usize, qset: usize) -> Result<Self> {
        if quantum == 0 || qset == 0 {
            return Err(ScullError::InvalidArgument);
        }
        quantum
            .checked_mul(qset)
            .and_then(|span| u64::try_from(span).ok())
            .ok_or(ScullError::InvalidArgument)?;
        Ok(Self { quantum, qset })
    }

    #[must_use]
    pub fn quantum(&self) -> usize {
        self.quantum
    }

    #[must_use]
    pub fn qset(&self) -> usize {
        self.qset
    }

    /// Bytes covered by one node
    #[must_use]
    pub fn node_span(&self) -> u64 {
        // Checked in `new`
        (self.quantum * self.qset) as u64
    }

    /// # Errors
    ///
    /// `InvalidArgument` if the node index does not fit in `usize`.
    pub fn locate(&self, offset: u64) -> Result<Position> {
        let span = self.node_span();
        let node = usize::try_from(offset / span).map_err(|_| ScullError::InvalidArgument)?;
        // The remainder is below `span`, which came from a usize
        #[allow(clippy::cast_possible_truncation)]
        let within = (offset % span) as usize;
        Ok(Position {
            node,
            slot: within / self.quantum,
            byte: within % self.quantum,
        })
    }

    /// Return a copy with one tunable replaced
    ///
    /// # Errors
    ///
    /// Same as [`Geometry::new`].
    pub fn with_quantum(self, quantum: usize) -> Result<Self> {
        Self::new(quantum, self.qset)
    }

    /// # Errors
    ///
    /// Same as [`Geometry::new`].
    pub fn with_qset(self, qset: usize) -> Result<Self> {
        Self::new(self.quantum, qset)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            quantum: SCULL_QUANTUM,
            qset: SCULL_QSET,
        }
    }
}
