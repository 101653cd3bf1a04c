//! Store-backed device
//!
//! A [`QuantumStore`] behind a [`BlockingGate`]. Every operation takes the
//! gate (interruptibly), runs one store call and releases the gate. Nothing
//! here ever sleeps on a condition: the only suspension point is the lock.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::gate::BlockingGate;
use crate::geometry::Geometry;
use crate::io::{UserSink, UserSource};
use crate::ioctl::{self, Capabilities, Command};
use crate::quantum::QuantumStore;
use crate::registry::AccessMode;

pub struct ScullDevice {
    index: usize,
    gate: BlockingGate<QuantumStore>,
}

impl ScullDevice {
    #[must_use]
    pub fn new(index: usize, geometry: Geometry) -> Self {
        Self {
            index,
            gate: BlockingGate::new(QuantumStore::new(geometry)),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Opening write-only truncates the device
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock.
    pub async fn open(&self, access: AccessMode, cancel: &CancellationToken) -> Result<()> {
        if access == AccessMode::WriteOnly {
            let mut store = self.gate.lock(cancel).await?;
            log::debug!("scull{}: opened write-only, trimming", self.index);
            store.trim();
        }
        log::debug!("scull{}: opened {access:?}", self.index);
        Ok(())
    }

    /// # Errors
    ///
    /// `Interrupted` or `Fault`.
    pub async fn read<S>(
        &self,
        pos: &mut u64,
        buf: &mut S,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        S: UserSink + ?Sized,
    {
        let store = self.gate.lock(cancel).await?;
        let n = store.read(pos, buf)?;
        drop(store);
        log::debug!("scull{}: read {n} bytes", self.index);
        Ok(n)
    }

    /// # Errors
    ///
    /// `Interrupted`, `OutOfMemory` or `Fault`.
    pub async fn write<S>(
        &self,
        pos: &mut u64,
        src: &S,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        S: UserSource + ?Sized,
    {
        let mut store = self.gate.lock(cancel).await?;
        let result = store.write(pos, src);
        drop(store);
        match &result {
            Ok(n) => log::debug!("scull{}: wrote {n} bytes", self.index),
            Err(e) => log::debug!("scull{}: write failed: {e}", self.index),
        }
        result
    }

    /// # Errors
    ///
    /// `Interrupted`, or whatever the command itself reports.
    pub async fn ioctl(
        &self,
        command: Command<'_>,
        caps: Capabilities,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut store = self.gate.lock(cancel).await?;
        ioctl::execute(&mut store, command, caps)
    }

    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock.
    pub async fn trim(&self, cancel: &CancellationToken) -> Result<()> {
        self.gate.lock(cancel).await?.trim();
        Ok(())
    }

    /// High-water mark of bytes written
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock.
    pub async fn size(&self, cancel: &CancellationToken) -> Result<u64> {
        Ok(self.gate.lock(cancel).await?.size())
    }

    /// Snapshot of the geometry in use and the configured one
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the lock.
    pub async fn geometry(&self, cancel: &CancellationToken) -> Result<(Geometry, Geometry)> {
        let store = self.gate.lock(cancel).await?;
        Ok((store.geometry(), store.configured()))
    }
}

impl std::fmt::Debug for ScullDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScullDevice(scull{})", self.index)
    }
}
