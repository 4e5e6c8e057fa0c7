//! Wire frames: a class byte, an opcode byte, and fixed operands.

use std::fmt;

/// Class byte of commands addressed to the selected FSM core.
pub const CLASS_CORE: u8 = 0x00;

/// Class byte of slow analog output commands.
pub const CLASS_ANALOG: u8 = 0x01;

/// Class byte of global device queries.
pub const CLASS_GLOBAL: u8 = 0xFF;

/// Echo byte returned by a healthy link for [`Opcode::Sync`].
pub const SYNC_ECHO: u8 = 0xD0;

/// Every command the host sends to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    SelectCore,
    Run,
    Hold,
    ForceState,
    SetNextState,
    SetConditionMode,
    SetTimerThreshold,
    SetVisitThreshold,
    SetPulseVoltage,
    GetPinValues,
    GetCurrentState,
    GetVisitCounter,
    ResetVisitCounters,
    Sync,
    SetDataPattern,
    SetBits,
    ClearBits,
    SetInputs,
    SerialNumber,
    IsStateOccupied,
    FreeState,
    FreeStateSoft,
    SetSlowVoltage,
    CommitSlowVoltage,
    SetLogicLevel,
    FirmwareVersion,
    BuildId,
    BuildTime,
}

impl Opcode {
    /// The two leading bytes of the frame.
    pub const fn header(self) -> [u8; 2] {
        match self {
            Opcode::SelectCore => [CLASS_CORE, 0x0B],
            Opcode::Run => [CLASS_CORE, 0x01],
            Opcode::Hold => [CLASS_CORE, 0x02],
            Opcode::ForceState => [CLASS_CORE, 0x03],
            Opcode::SetNextState => [CLASS_CORE, 0x05],
            Opcode::SetConditionMode => [CLASS_CORE, 0x07],
            Opcode::SetTimerThreshold => [CLASS_CORE, 0x09],
            Opcode::SetVisitThreshold => [CLASS_CORE, 0x19],
            Opcode::SetPulseVoltage => [CLASS_CORE, 0x1E],
            Opcode::GetPinValues => [CLASS_CORE, 0x0F],
            Opcode::GetCurrentState => [CLASS_CORE, 0x10],
            Opcode::GetVisitCounter => [CLASS_CORE, 0x1A],
            Opcode::ResetVisitCounters => [CLASS_CORE, 0x1B],
            Opcode::Sync => [CLASS_CORE, 0x20],
            Opcode::SetDataPattern => [CLASS_CORE, 0x21],
            Opcode::SetBits => [CLASS_CORE, 0x2D],
            Opcode::ClearBits => [CLASS_CORE, 0x2E],
            Opcode::SetInputs => [CLASS_CORE, 0x2F],
            Opcode::SerialNumber => [CLASS_CORE, 0x36],
            Opcode::IsStateOccupied => [CLASS_CORE, 0x37],
            Opcode::FreeState => [CLASS_CORE, 0x38],
            Opcode::FreeStateSoft => [CLASS_CORE, 0x39],
            Opcode::SetSlowVoltage => [CLASS_ANALOG, 0x00],
            Opcode::CommitSlowVoltage => [CLASS_ANALOG, 0x01],
            Opcode::SetLogicLevel => [CLASS_ANALOG, 0x02],
            Opcode::FirmwareVersion => [CLASS_GLOBAL, 0x06],
            Opcode::BuildId => [CLASS_GLOBAL, 0x08],
            Opcode::BuildTime => [CLASS_GLOBAL, 0x09],
        }
    }

    /// Whether the link must select the target core before this opcode.
    pub const fn is_core_scoped(self) -> bool {
        !matches!(
            self,
            Opcode::SelectCore
                | Opcode::Sync
                | Opcode::SetDataPattern
                | Opcode::SerialNumber
                | Opcode::SetSlowVoltage
                | Opcode::CommitSlowVoltage
                | Opcode::SetLogicLevel
                | Opcode::FirmwareVersion
                | Opcode::BuildId
                | Opcode::BuildTime
        )
    }

    /// Operand length for fixed-layout opcodes, `None` for variable length.
    pub const fn operand_len(self) -> Option<usize> {
        match self {
            Opcode::Run
            | Opcode::Hold
            | Opcode::GetPinValues
            | Opcode::GetCurrentState
            | Opcode::ResetVisitCounters
            | Opcode::Sync
            | Opcode::SerialNumber
            | Opcode::CommitSlowVoltage
            | Opcode::FirmwareVersion
            | Opcode::BuildId
            | Opcode::BuildTime => Some(0),
            Opcode::SelectCore
            | Opcode::ForceState
            | Opcode::GetVisitCounter
            | Opcode::IsStateOccupied
            | Opcode::FreeState
            | Opcode::FreeStateSoft => Some(1),
            Opcode::SetLogicLevel => Some(2),
            Opcode::SetNextState | Opcode::SetSlowVoltage => Some(3),
            Opcode::SetConditionMode => Some(4),
            Opcode::SetTimerThreshold
            | Opcode::SetVisitThreshold
            | Opcode::SetBits
            | Opcode::ClearBits
            | Opcode::SetInputs => Some(5),
            Opcode::SetPulseVoltage => Some(6),
            Opcode::SetDataPattern => None,
        }
    }

    /// Look up an opcode from its frame header.
    pub fn from_header(class: u8, code: u8) -> Option<Self> {
        ALL_OPCODES
            .iter()
            .copied()
            .find(|op| op.header() == [class, code])
    }
}

const ALL_OPCODES: [Opcode; 28] = [
    Opcode::SelectCore,
    Opcode::Run,
    Opcode::Hold,
    Opcode::ForceState,
    Opcode::SetNextState,
    Opcode::SetConditionMode,
    Opcode::SetTimerThreshold,
    Opcode::SetVisitThreshold,
    Opcode::SetPulseVoltage,
    Opcode::GetPinValues,
    Opcode::GetCurrentState,
    Opcode::GetVisitCounter,
    Opcode::ResetVisitCounters,
    Opcode::Sync,
    Opcode::SetDataPattern,
    Opcode::SetBits,
    Opcode::ClearBits,
    Opcode::SetInputs,
    Opcode::SerialNumber,
    Opcode::IsStateOccupied,
    Opcode::FreeState,
    Opcode::FreeStateSoft,
    Opcode::SetSlowVoltage,
    Opcode::CommitSlowVoltage,
    Opcode::SetLogicLevel,
    Opcode::FirmwareVersion,
    Opcode::BuildId,
    Opcode::BuildTime,
];

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [class, code] = self.header();
        write!(f, "{:?}({:02X} {:02X})", self, class, code)
    }
}

/// One command frame, before core selection is prepended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub operands: Vec<u8>,
}

impl Command {
    pub fn new(opcode: Opcode, operands: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            operands: operands.into(),
        }
    }

    /// Serialized frame: header followed by operands.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.operands.len());
        bytes.extend_from_slice(&self.opcode.header());
        bytes.extend_from_slice(&self.operands);
        bytes
    }
}
