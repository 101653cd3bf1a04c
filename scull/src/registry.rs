//! Device registry: the set of devices created at load time
//!
//! Replaces device-number lookups with a typed [`DeviceId`]. Opening a
//! device yields a [`File`] that owns its position, flags and cancellation
//! token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::complete::CompletionDevice;
use crate::config::{ConfigError, ScullConfig};
use crate::error::{Result, ScullError};
use crate::file::{File, Target};
use crate::ioctl::Capabilities;
use crate::pipe::PipeDevice;
use crate::ring::Sides;
use crate::scull::ScullDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    /// `scullN`
    Scull(usize),
    /// `scullpipeN`
    Pipe(usize),
    /// The completion device
    Complete,
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scull(i) => write!(f, "scull{i}"),
            Self::Pipe(i) => write!(f, "scullpipe{i}"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

impl AccessMode {
    #[must_use]
    pub fn can_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    /// Pipe sides counted by a handle with this access
    #[must_use]
    pub fn sides(self) -> Sides {
        Sides {
            reader: self.can_read(),
            writer: self.can_write(),
        }
    }
}

/// Flags for [`DeviceRegistry::open`]
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub(crate) access: AccessMode,
    pub(crate) nonblocking: bool,
    pub(crate) caps: Capabilities,
    pub(crate) cancel: CancellationToken,
}

impl OpenOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    #[must_use]
    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Token whose cancellation interrupts every wait on the handle
    #[must_use]
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug)]
pub struct DeviceRegistry {
    scull: Vec<Arc<ScullDevice>>,
    pipes: Vec<Arc<PipeDevice>>,
    complete: Arc<CompletionDevice>,
}

impl DeviceRegistry {
    /// # Errors
    ///
    /// `Invalid` if the configuration does not validate.
    pub fn new(config: &ScullConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let geometry = config.geometry()?;
        let scull = (0..config.nr_devs)
            .map(|i| Arc::new(ScullDevice::new(i, geometry)))
            .collect();
        let pipes = (0..config.pipe_nr_devs)
            .map(|i| Arc::new(PipeDevice::new(i, config.pipe_buffer)))
            .collect();
        info!(
            nr_devs = config.nr_devs,
            pipe_nr_devs = config.pipe_nr_devs,
            quantum = config.quantum,
            qset = config.qset,
            pipe_buffer = config.pipe_buffer,
            "devices registered"
        );
        Ok(Self {
            scull,
            pipes,
            complete: Arc::new(CompletionDevice::new()),
        })
    }

    #[must_use]
    pub fn scull(&self, index: usize) -> Option<&Arc<ScullDevice>> {
        self.scull.get(index)
    }

    #[must_use]
    pub fn pipe(&self, index: usize) -> Option<&Arc<PipeDevice>> {
        self.pipes.get(index)
    }

    #[must_use]
    pub fn complete(&self) -> &Arc<CompletionDevice> {
        &self.complete
    }

    /// Every registered id, stores first
    pub fn ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        (0..self.scull.len())
            .map(DeviceId::Scull)
            .chain((0..self.pipes.len()).map(DeviceId::Pipe))
            .chain(std::iter::once(DeviceId::Complete))
    }

    /// Open a device and return a handle to it.
    ///
    /// # Errors
    ///
    /// - `NoDevice` for an id that is not registered.
    /// - `Interrupted` if the token is cancelled while waiting for the lock.
    /// - `OutOfMemory` if a pipe ring cannot be allocated.
    pub async fn open(&self, id: DeviceId, options: OpenOptions) -> Result<File> {
        let target = match id {
            DeviceId::Scull(i) => {
                let device = self.scull.get(i).ok_or(ScullError::NoDevice(id))?;
                device.open(options.access, &options.cancel).await?;
                Target::Scull(Arc::clone(device))
            }
            DeviceId::Pipe(i) => {
                let device = self.pipes.get(i).ok_or(ScullError::NoDevice(id))?;
                device
                    .open(options.access.sides(), &options.cancel)
                    .await?;
                Target::Pipe(Arc::clone(device))
            }
            DeviceId::Complete => Target::Complete(Arc::clone(&self.complete)),
        };
        debug!(device = %id, access = ?options.access, nonblocking = options.nonblocking, "opened");
        Ok(File::new(id, target, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_sides() {
        assert_eq!(
            AccessMode::ReadOnly.sides(),
            Sides {
                reader: true,
                writer: false
            }
        );
        assert_eq!(
            AccessMode::ReadWrite.sides(),
            Sides {
                reader: true,
                writer: true
            }
        );
        assert!(!AccessMode::WriteOnly.can_read());
    }

    #[test]
    fn test_registry_layout() {
        let config = ScullConfig {
            nr_devs: 2,
            pipe_nr_devs: 1,
            ..ScullConfig::default()
        };
        let registry = DeviceRegistry::new(&config).unwrap();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(
            ids,
            vec![
                DeviceId::Scull(0),
                DeviceId::Scull(1),
                DeviceId::Pipe(0),
                DeviceId::Complete
            ]
        );
        assert_eq!(DeviceId::Pipe(0).to_string(), "scullpipe0");
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let registry = DeviceRegistry::new(&ScullConfig::default()).unwrap();
        let err = registry
            .open(DeviceId::Scull(99), OpenOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err, ScullError::NoDevice(DeviceId::Scull(99)));
        assert_eq!(err.errno(), 19);
    }
}
