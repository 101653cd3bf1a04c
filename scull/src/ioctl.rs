//! Configuration commands
//!
//! Two tunables (`quantum`, `qset`) times six command shapes, plus a reset:
//!
//! | Shape    | Argument            | Result         | Privileged |
//! |----------|---------------------|----------------|------------|
//! | Reset    | none                | 0              | no         |
//! | Set      | new value by ref    | 0              | yes        |
//! | Tell     | new value inline    | 0              | yes        |
//! | Get      | ref receives value  | 0              | no         |
//! | Query    | none                | current value  | no         |
//! | Exchange | ref: new in, old out| 0              | yes        |
//! | Shift    | new value inline    | old value      | yes        |
//!
//! Raw identifiers are decoded into [`Command`] at the boundary; anything
//! that does not decode never reaches a device.

use crate::error::{Result, ScullError};
use crate::geometry::Geometry;
use crate::io::ArgSlot;
use crate::quantum::QuantumStore;

pub const SCULL_IOC_MAGIC: u8 = b'k';

/// Number of command identifiers
pub const SCULL_IOC_MAXNR: u32 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tunable {
    Quantum,
    Qset,
}

/// Raw command identifiers, in their historical order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandId {
    Reset = 0,
    SetQuantum,
    SetQset,
    TellQuantum,
    TellQset,
    GetQuantum,
    GetQset,
    QueryQuantum,
    QueryQset,
    ExchangeQuantum,
    ExchangeQset,
    ShiftQuantum,
    ShiftQset,
}

impl CommandId {
    pub const ALL: [CommandId; SCULL_IOC_MAXNR as usize] = [
        Self::Reset,
        Self::SetQuantum,
        Self::SetQset,
        Self::TellQuantum,
        Self::TellQset,
        Self::GetQuantum,
        Self::GetQset,
        Self::QueryQuantum,
        Self::QueryQset,
        Self::ExchangeQuantum,
        Self::ExchangeQset,
        Self::ShiftQuantum,
        Self::ShiftQset,
    ];

    /// Encoded identifier: magic byte above the index
    #[must_use]
    pub fn raw(self) -> u32 {
        (u32::from(SCULL_IOC_MAGIC) << 8) | self as u32
    }

    fn tunable(self) -> Option<Tunable> {
        match self {
            Self::Reset => None,
            Self::SetQuantum
            | Self::TellQuantum
            | Self::GetQuantum
            | Self::QueryQuantum
            | Self::ExchangeQuantum
            | Self::ShiftQuantum => Some(Tunable::Quantum),
            Self::SetQset
            | Self::TellQset
            | Self::GetQset
            | Self::QueryQset
            | Self::ExchangeQset
            | Self::ShiftQset => Some(Tunable::Qset),
        }
    }
}

impl TryFrom<u32> for CommandId {
    type Error = ScullError;

    fn try_from(raw: u32) -> Result<Self> {
        if raw >> 8 != u32::from(SCULL_IOC_MAGIC) {
            return Err(ScullError::InvalidArgument);
        }
        let index = usize::try_from(raw & 0xff).map_err(|_| ScullError::InvalidArgument)?;
        Self::ALL
            .get(index)
            .copied()
            .ok_or(ScullError::InvalidArgument)
    }
}

/// Argument as supplied by the caller, before decoding
pub enum CommandArg<'a> {
    None,
    Value(usize),
    Ref(&'a mut (dyn ArgSlot + Send)),
}

/// A decoded configuration command
pub enum Command<'a> {
    Reset,
    Set(Tunable, &'a mut (dyn ArgSlot + Send)),
    Tell(Tunable, usize),
    Get(Tunable, &'a mut (dyn ArgSlot + Send)),
    Query(Tunable),
    Exchange(Tunable, &'a mut (dyn ArgSlot + Send)),
    Shift(Tunable, usize),
}

impl<'a> Command<'a> {
    /// Decode a raw identifier and its argument.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a wrong magic byte, an unknown index, or an
    /// argument of the wrong shape.
    pub fn decode(raw: u32, arg: CommandArg<'a>) -> Result<Self> {
        use CommandId as C;

        let id = CommandId::try_from(raw)?;
        let Some(tunable) = id.tunable() else {
            return match arg {
                CommandArg::None => Ok(Self::Reset),
                _ => Err(ScullError::InvalidArgument),
            };
        };

        match (id, arg) {
            (C::SetQuantum | C::SetQset, CommandArg::Ref(slot)) => Ok(Self::Set(tunable, slot)),
            (C::TellQuantum | C::TellQset, CommandArg::Value(v)) => Ok(Self::Tell(tunable, v)),
            (C::GetQuantum | C::GetQset, CommandArg::Ref(slot)) => Ok(Self::Get(tunable, slot)),
            (C::QueryQuantum | C::QueryQset, CommandArg::None) => Ok(Self::Query(tunable)),
            (C::ExchangeQuantum | C::ExchangeQset, CommandArg::Ref(slot)) => {
                Ok(Self::Exchange(tunable, slot))
            }
            (C::ShiftQuantum | C::ShiftQset, CommandArg::Value(v)) => Ok(Self::Shift(tunable, v)),
            _ => Err(ScullError::InvalidArgument),
        }
    }

    /// Changes a tunable, so needs the admin capability
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Self::Set(..) | Self::Tell(..) | Self::Exchange(..) | Self::Shift(..)
        )
    }
}

impl std::fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reset => write!(f, "Reset"),
            Self::Set(t, _) => write!(f, "Set({t:?})"),
            Self::Tell(t, v) => write!(f, "Tell({t:?}, {v})"),
            Self::Get(t, _) => write!(f, "Get({t:?})"),
            Self::Query(t) => write!(f, "Query({t:?})"),
            Self::Exchange(t, _) => write!(f, "Exchange({t:?})"),
            Self::Shift(t, v) => write!(f, "Shift({t:?}, {v})"),
        }
    }
}

/// Capabilities of the caller issuing a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    sys_admin: bool,
}

impl Capabilities {
    #[must_use]
    pub fn admin() -> Self {
        Self { sys_admin: true }
    }

    #[must_use]
    pub fn unprivileged() -> Self {
        Self { sys_admin: false }
    }

    #[must_use]
    pub fn has_sys_admin(&self) -> bool {
        self.sys_admin
    }
}

fn current(store: &QuantumStore, tunable: Tunable) -> usize {
    let geometry = store.configured();
    match tunable {
        Tunable::Quantum => geometry.quantum(),
        Tunable::Qset => geometry.qset(),
    }
}

fn with_tunable(geometry: Geometry, tunable: Tunable, value: usize) -> Result<Geometry> {
    match tunable {
        Tunable::Quantum => geometry.with_quantum(value),
        Tunable::Qset => geometry.with_qset(value),
    }
}

fn assign(store: &mut QuantumStore, tunable: Tunable, value: usize) -> Result<()> {
    let geometry = with_tunable(store.configured(), tunable, value)?;
    if !store.configure(geometry) {
        log::debug!("{tunable:?}={value} staged until the next trim");
    }
    Ok(())
}

/// Run a decoded command against a store; call with the device lock held.
///
/// Returns the call's result value: the current value for Query, the old
/// value for Shift, 0 otherwise.
///
/// # Errors
///
/// - `PermissionDenied` for a privileged command without the capability.
/// - `Fault` if a by-reference argument cannot be read or written.
/// - `InvalidArgument` for a zero or overflowing tunable.
pub fn execute(
    store: &mut QuantumStore,
    command: Command<'_>,
    caps: Capabilities,
) -> Result<usize> {
    if command.is_privileged() && !caps.has_sys_admin() {
        return Err(ScullError::PermissionDenied);
    }
    log::debug!("ioctl {command:?}");

    match command {
        Command::Reset => {
            store.configure(Geometry::default());
            Ok(0)
        }
        Command::Set(tunable, slot) => {
            let value = slot.get()?;
            assign(store, tunable, value)?;
            Ok(0)
        }
        Command::Tell(tunable, value) => {
            assign(store, tunable, value)?;
            Ok(0)
        }
        Command::Get(tunable, slot) => {
            slot.put(current(store, tunable))?;
            Ok(0)
        }
        Command::Query(tunable) => Ok(current(store, tunable)),
        Command::Exchange(tunable, slot) => {
            let value = slot.get()?;
            let old = current(store, tunable);
            with_tunable(store.configured(), tunable, value)?;
            slot.put(old)?;
            assign(store, tunable, value)?;
            Ok(0)
        }
        Command::Shift(tunable, value) => {
            let old = current(store, tunable);
            assign(store, tunable, value)?;
            Ok(old)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CopyFault;

    struct BrokenSlot;

    impl ArgSlot for BrokenSlot {
        fn get(&self) -> std::result::Result<usize, CopyFault> {
            Err(CopyFault)
        }

        fn put(&mut self, _value: usize) -> std::result::Result<(), CopyFault> {
            Err(CopyFault)
        }
    }

    fn store() -> QuantumStore {
        QuantumStore::new(Geometry::new(10, 20).unwrap())
    }

    #[test]
    fn test_raw_ids_roundtrip_every_command() {
        for id in CommandId::ALL {
            assert_eq!(CommandId::try_from(id.raw()), Ok(id));
        }
        assert_eq!(CommandId::ShiftQset.raw(), (0x6b << 8) | 12);
    }

    #[test]
    fn test_unknown_ids_rejected() {
        let maxnr = (u32::from(SCULL_IOC_MAGIC) << 8) | SCULL_IOC_MAXNR;
        assert_eq!(CommandId::try_from(maxnr), Err(ScullError::InvalidArgument));
        let wrong_magic = (u32::from(b'x') << 8) | 1;
        assert_eq!(
            CommandId::try_from(wrong_magic),
            Err(ScullError::InvalidArgument)
        );
    }

    #[test]
    fn test_wrong_argument_shape_rejected() {
        let raw = CommandId::TellQuantum.raw();
        assert!(matches!(
            Command::decode(raw, CommandArg::None),
            Err(ScullError::InvalidArgument)
        ));
        let mut slot = 3usize;
        assert!(matches!(
            Command::decode(CommandId::QueryQset.raw(), CommandArg::Ref(&mut slot)),
            Err(ScullError::InvalidArgument)
        ));
    }

    #[test]
    fn test_query_and_get() {
        let mut store = store();
        let caps = Capabilities::unprivileged();
        assert_eq!(
            execute(&mut store, Command::Query(Tunable::Quantum), caps),
            Ok(10)
        );
        let mut slot = 0usize;
        execute(&mut store, Command::Get(Tunable::Qset, &mut slot), caps).unwrap();
        assert_eq!(slot, 20);
    }

    #[test]
    fn test_privileged_commands_need_admin() {
        let mut store = store();
        let caps = Capabilities::unprivileged();
        assert_eq!(
            execute(&mut store, Command::Tell(Tunable::Quantum, 5), caps),
            Err(ScullError::PermissionDenied)
        );
        assert_eq!(
            execute(&mut store, Command::Shift(Tunable::Qset, 5), caps),
            Err(ScullError::PermissionDenied)
        );
        assert_eq!(store.configured().quantum(), 10);
    }

    #[test]
    fn test_exchange_swaps_through_slot() {
        let mut store = store();
        let mut slot = 64usize;
        execute(
            &mut store,
            Command::Exchange(Tunable::Quantum, &mut slot),
            Capabilities::admin(),
        )
        .unwrap();
        assert_eq!(slot, 10);
        assert_eq!(store.configured().quantum(), 64);
    }

    #[test]
    fn test_shift_returns_old_value() {
        let mut store = store();
        let old = execute(
            &mut store,
            Command::Shift(Tunable::Qset, 7),
            Capabilities::admin(),
        );
        assert_eq!(old, Ok(20));
        assert_eq!(store.configured().qset(), 7);
    }

    #[test]
    fn test_reset_restores_compiled_defaults() {
        let mut store = store();
        execute(&mut store, Command::Reset, Capabilities::unprivileged()).unwrap();
        assert_eq!(store.configured(), Geometry::default());
    }

    #[test]
    fn test_zero_value_rejected() {
        let mut store = store();
        assert_eq!(
            execute(&mut store, Command::Tell(Tunable::Quantum, 0), Capabilities::admin()),
            Err(ScullError::InvalidArgument)
        );
    }

    #[test]
    fn test_faulting_slot() {
        let mut store = store();
        let mut slot = BrokenSlot;
        assert_eq!(
            execute(
                &mut store,
                Command::Set(Tunable::Quantum, &mut slot),
                Capabilities::admin()
            ),
            Err(ScullError::Fault)
        );
        assert_eq!(
            execute(
                &mut store,
                Command::Get(Tunable::Quantum, &mut slot),
                Capabilities::admin()
            ),
            Err(ScullError::Fault)
        );
    }
}
