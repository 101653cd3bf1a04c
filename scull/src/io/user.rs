//! Caller-memory seams
//!
//! A driver never touches caller memory directly: every transfer goes
//! through a copy routine that may fail. These traits are that routine.
//! Byte slices and plain integers implement them infallibly; other
//! implementations (tests, foreign buffers) may report [`CopyFault`].

/// A copy into or out of caller memory failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFault;

impl std::fmt::Display for CopyFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "copy to or from caller memory failed")
    }
}

impl std::error::Error for CopyFault {}

/// Caller memory that data is written from
pub trait UserSource {
    /// Number of bytes the caller offers
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the first `dst.len()` offered bytes into `dst`
    ///
    /// `dst.len()` never exceeds `self.len()`.
    fn copy_into(&self, dst: &mut [u8]) -> Result<(), CopyFault>;
}

/// Caller memory that data is read into
pub trait UserSink {
    /// Number of bytes the caller can accept
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `src` to the start of the caller memory
    ///
    /// `src.len()` never exceeds `self.len()`.
    fn copy_from(&mut self, src: &[u8]) -> Result<(), CopyFault>;
}

/// An integer argument passed by reference (Set, Get, Exchange commands)
pub trait ArgSlot {
    fn get(&self) -> Result<usize, CopyFault>;
    fn put(&mut self, value: usize) -> Result<(), CopyFault>;
}

impl UserSource for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_into(&self, dst: &mut [u8]) -> Result<(), CopyFault> {
        let src = self.get(..dst.len()).ok_or(CopyFault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl UserSource for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn copy_into(&self, dst: &mut [u8]) -> Result<(), CopyFault> {
        self.as_slice().copy_into(dst)
    }
}

impl UserSink for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_from(&mut self, src: &[u8]) -> Result<(), CopyFault> {
        let dst = self.get_mut(..src.len()).ok_or(CopyFault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl ArgSlot for usize {
    fn get(&self) -> Result<usize, CopyFault> {
        Ok(*self)
    }

    fn put(&mut self, value: usize) -> Result<(), CopyFault> {
        *self = value;
        Ok(())
    }
}
