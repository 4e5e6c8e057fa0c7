//! Signal-level vocabulary shared by the encoder and the compiler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest GPIO pin index the FSM can drive or watch.
pub const MIN_PIN: u8 = 0;

/// Highest GPIO pin index the FSM can drive or watch.
pub const MAX_PIN: u8 = 31;

/// Transition slot of a state. `High` is evaluated before `Low`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Low,
}

impl Priority {
    pub const fn wire(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Low => 1,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Priority::High),
            1 => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Edge sensitivity of a trigger condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Rising,
    Falling,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => f.write_str("rising"),
            Edge::Falling => f.write_str("falling"),
        }
    }
}

/// Logic level, used both for level triggers and for GPIO outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => f.write_str("0"),
            Level::High => f.write_str("1"),
        }
    }
}

/// High-speed analog output used to apply glitch pulses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PulseChannel {
    Ch1,
    Ch2,
}

impl PulseChannel {
    pub const fn wire(self) -> u8 {
        match self {
            PulseChannel::Ch1 => 0,
            PulseChannel::Ch2 => 1,
        }
    }

    /// Position in per-channel tables.
    pub const fn index(self) -> usize {
        self.wire() as usize
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(PulseChannel::Ch1),
            1 => Some(PulseChannel::Ch2),
            _ => None,
        }
    }
}

impl fmt::Display for PulseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.wire() + 1)
    }
}
