//! FSM state slot and core identifiers.
//!
//! Each core of the device owns 256 state slots. Indices are carried as
//! [`StateId`] so that an out-of-range slot cannot be expressed at all.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of state slots in each core.
pub const STATES_PER_CORE: usize = 256;

/// Index of an FSM state slot within one core.
///
/// # Example
///
/// ```rust
/// use chronoglitch::core::StateId;
///
/// let state = StateId::new(17);
/// assert_eq!(state.index(), 17);
/// assert_eq!(state.to_string(), "S17");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(u8);

impl StateId {
    /// First slot of a core.
    pub const MIN: StateId = StateId(0);

    /// Last slot of a core.
    pub const MAX: StateId = StateId(u8::MAX);

    pub const fn new(index: u8) -> Self {
        StateId(index)
    }

    /// Slot index as a `usize`, for table lookups.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw wire byte.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Iterate over every slot of a core in ascending order.
    pub fn all() -> impl Iterator<Item = StateId> {
        (0..=u8::MAX).map(StateId)
    }
}

impl From<u8> for StateId {
    fn from(index: u8) -> Self {
        StateId(index)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// One of the two independent FSM engines of the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Core {
    #[default]
    One,
    Two,
}

impl Core {
    /// Wire id used by the select-core frame.
    pub const fn id(self) -> u8 {
        match self {
            Core::One => 0,
            Core::Two => 1,
        }
    }

    /// Human-facing number, as printed on the device (1-based).
    pub const fn number(self) -> u8 {
        self.id() + 1
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Core::One),
            1 => Some(Core::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CORE{}", self.number())
    }
}
