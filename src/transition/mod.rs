//! Transition encoding.
//!
//! A logical transition is programmed with two or three consecutive wire
//! commands that all configure the source state:
//!
//! 1. set next-state: wire `(priority, src, dst)`
//! 2. set condition mode: arm the condition register of `(priority, src)`
//! 3. for counting conditions only, load the timer or visit threshold
//!
//! The order is significant. Encoding is pure, so the command list can be
//! inspected without a device.
//!
//! # Example
//!
//! ```rust
//! use chronoglitch::core::{Edge, Priority, StateId};
//! use chronoglitch::transition::{Condition, Transition};
//!
//! let t = Transition::new(
//!     StateId::new(1),
//!     Priority::Low,
//!     StateId::new(1),
//!     Condition::Edge { pin: 8, edge: Edge::Rising },
//! );
//! let commands = t.encode().unwrap();
//! assert_eq!(commands.len(), 2);
//! ```

mod condition;
pub mod error;

pub use condition::Condition;
pub(crate) use condition::check_pin;
pub use error::ParameterError;

use crate::core::{Priority, StateId};
use crate::link::codec::{MAX_CYCLES, MIN_CYCLES};
use crate::link::frame::{Command, Opcode};
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

/// One transition rule of a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub source: StateId,
    pub priority: Priority,
    pub destination: StateId,
    pub condition: Condition,
}

impl Transition {
    pub fn new(
        source: StateId,
        priority: Priority,
        destination: StateId,
        condition: Condition,
    ) -> Self {
        Self {
            source,
            priority,
            destination,
            condition,
        }
    }

    /// The rule that switches a priority slot of `state` off.
    pub fn disabled(state: StateId, priority: Priority) -> Self {
        Self::new(state, priority, StateId::MIN, Condition::Disabled)
    }

    /// Encode into the ordered command list that programs this rule.
    pub fn encode(&self) -> Result<Vec<Command>, ParameterError> {
        let mode = self.condition.mode()?;
        let threshold = match self.condition {
            Condition::Elapsed(ticks) => Some((Opcode::SetTimerThreshold, ticks.register())),
            Condition::Visits { count } => {
                if !(MIN_CYCLES..=MAX_CYCLES).contains(&count) {
                    return Err(ParameterError::VisitCountOutOfRange {
                        count,
                        min: MIN_CYCLES,
                        max: MAX_CYCLES,
                    });
                }
                Some((Opcode::SetVisitThreshold, (count - 1) as u32))
            }
            _ => None,
        };

        let src = self.source.as_u8();
        let priority = self.priority.wire();
        let [mode_hi, mode_lo] = mode.to_be_bytes();

        let mut commands = vec![
            Command::new(
                Opcode::SetNextState,
                [priority, src, self.destination.as_u8()],
            ),
            Command::new(Opcode::SetConditionMode, [priority, src, mode_hi, mode_lo]),
        ];
        if let Some((opcode, value)) = threshold {
            let mut operands = [src, 0, 0, 0, 0];
            BigEndian::write_u32(&mut operands[1..], value);
            commands.push(Command::new(opcode, operands));
        }
        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Edge, Level};
    use crate::link::codec::Ticks;

    fn s(i: u8) -> StateId {
        StateId::new(i)
    }

    #[test]
    fn edge_transition_is_two_commands() {
        let t = Transition::new(
            s(3),
            Priority::High,
            s(4),
            Condition::Edge {
                pin: 2,
                edge: Edge::Falling,
            },
        );
        let bytes: Vec<Vec<u8>> = t.encode().unwrap().iter().map(Command::to_bytes).collect();
        assert_eq!(
            bytes,
            vec![
                vec![0x00, 0x05, 0x00, 0x03, 0x04],
                vec![0x00, 0x07, 0x00, 0x03, 0x00, 0x26],
            ]
        );
    }

    #[test]
    fn time_transition_loads_timer_last() {
        let t = Transition::new(
            s(10),
            Priority::High,
            s(11),
            Condition::Elapsed(Ticks::new(375).unwrap()),
        );
        let commands = t.encode().unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].opcode, Opcode::SetNextState);
        assert_eq!(commands[1].operands, vec![0x00, 10, 0x00, 0x01]);
        assert_eq!(commands[2].opcode, Opcode::SetTimerThreshold);
        assert_eq!(commands[2].operands, vec![10, 0x00, 0x00, 0x01, 0x76]);
    }

    #[test]
    fn zero_tick_transition_does_not_deserialize() {
        let t = Transition::new(
            s(10),
            Priority::High,
            s(11),
            Condition::Elapsed(Ticks::new(375).unwrap()),
        );
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(serde_json::from_str::<Transition>(&json).unwrap(), t);

        let zero = json.replace("\"Elapsed\":375", "\"Elapsed\":0");
        assert_ne!(zero, json);
        assert!(serde_json::from_str::<Transition>(&zero).is_err());
    }

    #[test]
    fn visit_transition_writes_count_minus_one() {
        let t = Transition::new(s(0), Priority::Low, s(1), Condition::Visits { count: 2 });
        let commands = t.encode().unwrap();
        assert_eq!(commands[1].operands, vec![0x01, 0, 0x00, 0x03]);
        assert_eq!(commands[2].opcode, Opcode::SetVisitThreshold);
        assert_eq!(commands[2].operands, vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn visit_count_zero_is_rejected() {
        let t = Transition::new(s(0), Priority::Low, s(1), Condition::Visits { count: 0 });
        assert!(matches!(
            t.encode(),
            Err(ParameterError::VisitCountOutOfRange { count: 0, .. })
        ));
    }

    #[test]
    fn level_and_pattern_have_no_threshold() {
        let level = Transition::new(
            s(5),
            Priority::Low,
            s(6),
            Condition::Level {
                pin: 0,
                level: Level::High,
            },
        );
        assert_eq!(level.encode().unwrap().len(), 2);

        let pattern = Transition::new(s(5), Priority::High, s(7), Condition::PatternMatch);
        let commands = pattern.encode().unwrap();
        assert_eq!(commands[1].operands, vec![0x00, 5, 0x02, 0x02]);
    }

    #[test]
    fn disable_zeroes_destination_and_mode() {
        let commands = Transition::disabled(s(9), Priority::Low).encode().unwrap();
        assert_eq!(
            commands,
            vec![
                Command::new(Opcode::SetNextState, [0x01, 9, 0]),
                Command::new(Opcode::SetConditionMode, [0x01, 9, 0, 0]),
            ]
        );
    }
}
