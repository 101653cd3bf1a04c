//! Open device handle
//!
//! A [`File`] is what [`crate::DeviceRegistry::open`] returns. It carries
//! the per-open state: position, access mode, non-blocking flag,
//! capabilities and the cancellation token that interrupts its waits.
//!
//! Closing a pipe handle uncounts it from the ring. Prefer the async
//! [`File::close`]; a handle that is dropped without it (or whose close was
//! interrupted) is still uncounted, without honouring cancellation.

use std::io::SeekFrom;
use std::sync::Arc;

use embedded_io_async::{ErrorType, Read, Write};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::complete::CompletionDevice;
use crate::error::{Result, ScullError};
use crate::gate::Blocking;
use crate::io::{UserSink, UserSource};
use crate::ioctl::{Capabilities, Command, CommandArg};
use crate::pipe::{PipeDevice, Readiness};
use crate::registry::{AccessMode, DeviceId, OpenOptions};
use crate::scull::ScullDevice;

pub(crate) enum Target {
    Scull(Arc<ScullDevice>),
    Pipe(Arc<PipeDevice>),
    Complete(Arc<CompletionDevice>),
}

pub struct File {
    id: DeviceId,
    target: Target,
    pos: u64,
    access: AccessMode,
    nonblocking: bool,
    caps: Capabilities,
    cancel: CancellationToken,
    closed: bool,
}

impl File {
    pub(crate) fn new(id: DeviceId, target: Target, options: OpenOptions) -> Self {
        Self {
            id,
            target,
            pos: 0,
            access: options.access,
            nonblocking: options.nonblocking,
            caps: options.caps,
            cancel: options.cancel,
            closed: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub fn access(&self) -> AccessMode {
        self.access
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// Toggle non-blocking mode on an open handle
    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn mode(&self) -> Blocking {
        Blocking::from_nonblocking(self.nonblocking)
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_user(buf).await
    }

    pub async fn write(&mut self, src: &[u8]) -> Result<usize> {
        self.write_user(src).await
    }

    /// Read into caller memory; the position advances by the count read.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` on a handle without read access, otherwise whatever
    /// the device reports.
    pub async fn read_user<S>(&mut self, buf: &mut S) -> Result<usize>
    where
        S: UserSink + ?Sized,
    {
        if !self.access.can_read() {
            return Err(ScullError::BadDescriptor);
        }
        let mode = self.mode();
        match &self.target {
            Target::Scull(dev) => dev.read(&mut self.pos, buf, &self.cancel).await,
            Target::Pipe(dev) => dev.read(buf, mode, &self.cancel).await,
            Target::Complete(dev) => dev.read(&mut self.pos, buf, mode, &self.cancel).await,
        }
    }

    /// Write from caller memory; the position advances by the count written.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` on a handle without write access, otherwise whatever
    /// the device reports.
    pub async fn write_user<S>(&mut self, src: &S) -> Result<usize>
    where
        S: UserSource + ?Sized,
    {
        if !self.access.can_write() {
            return Err(ScullError::BadDescriptor);
        }
        let mode = self.mode();
        match &self.target {
            Target::Scull(dev) => dev.write(&mut self.pos, src, &self.cancel).await,
            Target::Pipe(dev) => dev.write(src, mode, &self.cancel).await,
            Target::Complete(dev) => Ok(dev.write(src)),
        }
    }

    /// Issue a raw configuration command
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `raw` and `arg` do not decode, otherwise see
    /// [`File::ioctl_command`].
    pub async fn ioctl(&mut self, raw: u32, arg: CommandArg<'_>) -> Result<usize> {
        let command = Command::decode(raw, arg)?;
        self.ioctl_command(command).await
    }

    /// # Errors
    ///
    /// `InvalidArgument` on a handle that is not a store device, otherwise
    /// whatever the command reports.
    pub async fn ioctl_command(&mut self, command: Command<'_>) -> Result<usize> {
        match &self.target {
            Target::Scull(dev) => dev.ioctl(command, self.caps, &self.cancel).await,
            Target::Pipe(_) | Target::Complete(_) => {
                debug!(device = %self.id, ?command, "config command on a non-store device");
                Err(ScullError::InvalidArgument)
            }
        }
    }

    /// Reposition a store handle; `End` is relative to the current size.
    ///
    /// Seeking past the end is allowed, a later write leaves a hole.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a negative or overflowing result and for
    /// handles that are not seekable.
    pub async fn seek(&mut self, whence: SeekFrom) -> Result<u64> {
        let Target::Scull(dev) = &self.target else {
            return Err(ScullError::InvalidArgument);
        };
        let new_pos = match whence {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => dev.size(&self.cancel).await?.checked_add_signed(delta),
        }
        .ok_or(ScullError::InvalidArgument)?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the device lock.
    pub async fn poll(&self) -> Result<Readiness> {
        match &self.target {
            Target::Scull(_) => Ok(Readiness {
                readable: true,
                writable: true,
            }),
            Target::Pipe(dev) => dev.poll(&self.cancel).await,
            Target::Complete(dev) => Ok(Readiness {
                readable: dev.is_pending(),
                writable: true,
            }),
        }
    }

    /// Release the handle.
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting for the pipe lock; the
    /// handle is then released uninterruptibly when dropped.
    pub async fn close(mut self) -> Result<()> {
        if let Target::Pipe(dev) = &self.target {
            dev.release(self.access.sides(), &self.cancel).await?;
        }
        self.closed = true;
        debug!(device = %self.id, "closed");
        Ok(())
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Target::Pipe(dev) = &self.target else {
            return;
        };
        let sides = self.access.sides();
        warn!(device = %self.id, "handle dropped without close, releasing");
        if dev.try_release(sides) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let dev = Arc::clone(dev);
                runtime.spawn(async move { dev.release_uninterruptible(sides).await });
            }
            Err(_) => dev.release_blocking(sides),
        }
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("id", &self.id)
            .field("pos", &self.pos)
            .field("access", &self.access)
            .field("nonblocking", &self.nonblocking)
            .finish_non_exhaustive()
    }
}

impl ErrorType for File {
    type Error = ScullError;
}

impl Read for File {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        File::read_user(self, buf).await
    }
}

impl Write for File {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        File::write_user(self, buf).await
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
