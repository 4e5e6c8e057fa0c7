//! Identifiers and signal vocabulary shared by every layer.
//!
//! This module contains the plain value types the rest of the crate speaks in:
//! - State slot and core identifiers
//! - Transition priorities, edges and levels
//! - Pulse channels
//!
//! Nothing here touches the wire.

mod signal;
mod state;

pub use signal::{Edge, Level, Priority, PulseChannel, MAX_PIN, MIN_PIN};
pub use state::{Core, StateId, STATES_PER_CORE};
