//! Chronoglitch: host-side compiler and controller for an FSM glitch device
//!
//! The device runs a small finite-state machine per core, clocked in 8 ns
//! ticks, whose states drive GPIO pins and two high-speed pulse channels.
//! This crate compiles linear glitch programs ("chronologies") onto that FSM
//! over a serial byte stream and drives trials with them.
//!
//! # Core Concepts
//!
//! - **Link**: Framed command/response protocol and core selection
//! - **Pool**: Device-authoritative allocation of the 256 state slots of a core
//! - **Transition**: Pure encoding of a trigger rule into wire commands
//! - **Chronology**: Verb-by-verb compilation of a strictly linear program
//! - **Controller**: Arm, start, wait and record trials
//!
//! # Example
//!
//! ```rust
//! use chronoglitch::chronology::Chronology;
//! use chronoglitch::config::LinkConfig;
//! use chronoglitch::core::{Edge, Level, PulseChannel};
//! use chronoglitch::link::sim::SimulatedDevice;
//! use chronoglitch::link::DeviceLink;
//!
//! let link = DeviceLink::open(SimulatedDevice::new(), &LinkConfig::default()).unwrap();
//! let mut chronology = Chronology::new(link).unwrap();
//!
//! chronology.set_pulse_voltage_now(PulseChannel::Ch1, 3.3).unwrap();
//! chronology.wait_trigger(8, Edge::Rising, 1).unwrap();
//! chronology.set_output(0, Level::High).unwrap();
//! chronology.pulse(PulseChannel::Ch1, 0.0, 3e-6, 40e-9).unwrap();
//! chronology.set_output(0, Level::Low).unwrap();
//!
//! chronology.start().unwrap();
//! assert!(!chronology.wait_until_finish(100).unwrap());
//! ```

pub mod chronology;
pub mod config;
pub mod controller;
pub mod core;
pub mod link;
pub mod pool;
pub mod transition;

// Re-export commonly used types
pub use chronology::{Chronology, ChronologyError, ChronologyListing, StepLabel};
pub use config::{ConfigError, ControllerConfig, LinkConfig};
pub use controller::{GlitchParams, PulseShape, TrialHistory, TrialRecord, TrialRunner};
pub use link::{DeviceLink, FirmwareVersion, LinkError, StreamTransport, Transport};
pub use pool::{PoolError, StatePool};
pub use transition::{Condition, ParameterError, Transition};
