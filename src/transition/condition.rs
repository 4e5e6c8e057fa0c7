//! Trigger conditions and their condition-register mode words.

use crate::core::{Edge, Level, MAX_PIN, MIN_PIN};
use crate::link::codec::Ticks;
use crate::transition::ParameterError;
use serde::{Deserialize, Serialize};

const MODE_PIN: u16 = 2;
const PATTERN_SOURCE: u16 = 32;

/// Condition under which a transition fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Never fires.
    Disabled,
    /// Fires once the state has been occupied for the given time.
    Elapsed(Ticks),
    /// Fires once the state's visit counter reaches `count` (1-based).
    Visits { count: u64 },
    Edge { pin: u8, edge: Edge },
    Level { pin: u8, level: Level },
    /// Fires when the sniffed data matches the loaded pattern.
    PatternMatch,
}

impl Condition {
    /// Mode word written into the condition register.
    pub fn mode(&self) -> Result<u16, ParameterError> {
        Ok(match *self {
            Condition::Disabled => 0x0000,
            Condition::Elapsed(_) => 0x0001,
            Condition::Visits { .. } => 0x0003,
            Condition::Edge { pin, edge } => {
                let sense = match edge {
                    Edge::Rising => 0x00,
                    Edge::Falling => 0x04,
                };
                MODE_PIN | (u16::from(check_pin(pin)?) << 4) | sense
            }
            Condition::Level { pin, level } => {
                let sense = match level {
                    Level::High => 0x0C,
                    Level::Low => 0x08,
                };
                MODE_PIN | (u16::from(check_pin(pin)?) << 4) | sense
            }
            Condition::PatternMatch => MODE_PIN | (PATTERN_SOURCE << 4),
        })
    }
}

pub(crate) fn check_pin(pin: u8) -> Result<u8, ParameterError> {
    if (MIN_PIN..=MAX_PIN).contains(&pin) {
        Ok(pin)
    } else {
        Err(ParameterError::PinOutOfRange {
            pin,
            min: MIN_PIN,
            max: MAX_PIN,
        })
    }
}
