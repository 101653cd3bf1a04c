//! Completion device
//!
//! A reader at position 0 sleeps until some writer signals a completion.
//! Each write completes exactly one reader, now or in the future; the
//! written bytes themselves are discarded. A woken reader gets a fixed
//! message, and any later read on the same handle is EOF.

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, ScullError};
use crate::gate::Blocking;
use crate::io::{UserSink, UserSource};

/// Reply handed to a woken reader, zero-padded to 50 bytes
pub const COMPLETION_MESSAGE: [u8; 50] = {
    let text = b"Writer finally wrote something\n";
    let mut message = [0u8; 50];
    let mut i = 0;
    while i < text.len() {
        message[i] = text[i];
        i += 1;
    }
    message
};

pub struct CompletionDevice {
    done: Semaphore,
}

impl CompletionDevice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            done: Semaphore::new(0),
        }
    }

    /// # Errors
    ///
    /// - `WouldBlock` if nothing is pending and `mode` is non-blocking.
    /// - `Interrupted` if cancelled while waiting.
    /// - `Fault` if the copy fails; the completion is consumed regardless.
    pub async fn read<S>(
        &self,
        pos: &mut u64,
        buf: &mut S,
        mode: Blocking,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        S: UserSink + ?Sized,
    {
        if *pos != 0 {
            return Ok(0);
        }

        let permit = match mode {
            Blocking::NonBlock => self
                .done
                .try_acquire()
                .map_err(|_| ScullError::WouldBlock)?,
            Blocking::Block => {
                debug!("completion reader going to sleep");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ScullError::Interrupted),
                    permit = self.done.acquire() => permit.map_err(|_| ScullError::Interrupted)?,
                }
            }
        };
        permit.forget();
        debug!("completion reader awoken");

        let n = buf.len().min(COMPLETION_MESSAGE.len());
        buf.copy_from(&COMPLETION_MESSAGE[..n])?;
        *pos += n as u64;
        Ok(n)
    }

    /// Complete one reader; the whole write is reported as consumed
    pub fn write<S>(&self, src: &S) -> usize
    where
        S: UserSource + ?Sized,
    {
        debug!("completion writer awakening a reader");
        self.done.add_permits(1);
        src.len()
    }

    /// A completion is waiting to be consumed
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.done.available_permits() > 0
    }
}

impl Default for CompletionDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionDevice")
            .field("pending", &self.done.available_permits())
            .finish()
    }
}
