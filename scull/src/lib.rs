//! In-memory character devices
//!
//! - `scullN`: a growable byte store addressed through a linked chain of
//!   quantum sets, with a configuration-command surface.
//! - `scullpipeN`: a bounded ring buffer with blocking (or non-blocking)
//!   producer/consumer semantics.
//! - `complete`: a rendezvous where each write completes one reader.
//!
//! Devices are created by a [`DeviceRegistry`] and accessed through [`File`]
//! handles. Any wait can be interrupted through the handle's cancellation
//! token.

pub mod complete;
pub mod config;
pub mod error;
pub mod file;
pub mod gate;
pub mod geometry;
pub mod io;
pub mod ioctl;
pub mod pipe;
pub mod quantum;
pub mod registry;
pub mod ring;
pub mod scull;
pub mod wait_queue;

pub use error::{Result, ScullError};

pub use config::{ConfigError, ScullConfig};

pub use registry::{AccessMode, DeviceId, DeviceRegistry, OpenOptions};

pub use file::File;

pub use gate::Blocking;

pub use geometry::Geometry;

pub use ioctl::{Capabilities, Command, CommandArg, CommandId, Tunable};

pub use pipe::Readiness;
