//! Sequence steps and their listing.

use crate::core::{Core, Edge, Level, PulseChannel, StateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a state of the sequence does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StepLabel {
    /// Freshly appended tail, no action yet.
    Nop,
    WaitTrigger { pin: u8, edge: Edge, count: u32 },
    SetOutput { pin: u8, level: Level },
    WaitTime { seconds: f64 },
    SetPulseVoltage { channel: PulseChannel, volts: f64 },
    /// First state of a pulse chain.
    Pulse {
        channel: PulseChannel,
        volts: f64,
        delay_s: f64,
        width_s: f64,
    },
    /// Remaining states of a pulse chain.
    ContinuedPulse,
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepLabel::Nop => write!(f, "NOP"),
            StepLabel::WaitTrigger { pin, edge, count } => {
                write!(f, "WAIT_TRIGGER pin {pin} {edge} x{count}")
            }
            StepLabel::SetOutput { pin, level } => write!(f, "SET_OUTPUT pin {pin} {level}"),
            StepLabel::WaitTime { seconds } => write!(f, "WAIT_TIME {seconds} s"),
            StepLabel::SetPulseVoltage { channel, volts } => {
                write!(f, "SET_PULSE_VOLTAGE {channel} {volts} V")
            }
            StepLabel::Pulse {
                channel,
                volts,
                delay_s,
                width_s,
            } => write!(
                f,
                "PULSE {channel} {volts} V, delay {delay_s} s, width {width_s} s"
            ),
            StepLabel::ContinuedPulse => write!(f, "CONTINUED_PULSE"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub state: StateId,
    pub label: StepLabel,
}

/// Snapshot of a compiled sequence, in program order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChronologyListing {
    pub core: Core,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<Step>,
}

impl fmt::Display for ChronologyListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{} {}", step.state, step.label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_render_like_a_report() {
        let label = StepLabel::WaitTrigger {
            pin: 8,
            edge: Edge::Rising,
            count: 1,
        };
        assert_eq!(label.to_string(), "WAIT_TRIGGER pin 8 rising x1");
        assert_eq!(StepLabel::ContinuedPulse.to_string(), "CONTINUED_PULSE");
    }

    #[test]
    fn listing_prints_one_line_per_state() {
        let listing = ChronologyListing {
            core: Core::One,
            created_at: Utc::now(),
            steps: vec![
                Step {
                    state: StateId::new(2),
                    label: StepLabel::WaitTime { seconds: 1e-6 },
                },
                Step {
                    state: StateId::new(3),
                    label: StepLabel::Nop,
                },
            ],
        };
        assert_eq!(listing.to_string(), "S2 WAIT_TIME 0.000001 s\nS3 NOP\n");
    }

    #[test]
    fn listing_serializes() {
        let listing = ChronologyListing {
            core: Core::Two,
            created_at: Utc::now(),
            steps: vec![Step {
                state: StateId::new(7),
                label: StepLabel::SetOutput {
                    pin: 1,
                    level: Level::High,
                },
            }],
        };
        let json = serde_json::to_string(&listing).unwrap();
        let back: ChronologyListing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, listing);
    }
}
