//! I/O boundary between the devices and their callers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  File (open handle)                 │
//! │  - position, access, O_NONBLOCK     │
//! │  - cancellation token               │
//! └─────────────────────────────────────┘
//!          │
//!          │ resolves to a device, copies through io::user
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  ScullDevice / PipeDevice           │
//! │  - BlockingGate (lock + wait queues)│
//! └─────────────────────────────────────┘
//!          │
//!          │ owns, mutated under the gate
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  QuantumStore / RingBuffer          │
//! │  - pure data structures, no locking │
//! └─────────────────────────────────────┘
//! ```

pub mod user;

pub use user::{ArgSlot, CopyFault, UserSink, UserSource};
