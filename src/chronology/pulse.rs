//! Decomposition of a delayed pulse into tick and half-tick states.
//!
//! The FSM advances in 8 ns ticks, but a state may switch its pulse-channel
//! output half a tick after entry. A 4 ns remainder of the delay or the
//! width is therefore realised as an extra one-tick fragment state whose
//! output changes midway.

use crate::link::codec::{Ticks, SUB_TICK_NS, TICK_NS};
use crate::transition::ParameterError;
use serde::{Deserialize, Serialize};

/// One state of a pulse chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseSymbol {
    /// Whole ticks of delay at rest voltage.
    Wait(Ticks),
    /// One tick: rest voltage, then pulse voltage after 4 ns.
    WaitFragment,
    /// Whole ticks at pulse voltage.
    Pulse(Ticks),
    /// One tick: pulse voltage, then rest voltage after 4 ns.
    PulseFragment,
}

// Absorbs float noise such as 3e-6 * 1e9 == 2999.9999999999995.
const NS_ROUNDING_SLACK: f64 = 1e-6;

/// Convert seconds to nanoseconds, rounded down to the 4 ns grid.
pub fn to_grid_ns(seconds: f64) -> u64 {
    let ns = (seconds * 1e9 + NS_ROUNDING_SLACK).floor().max(0.0) as u64;
    ns - ns % SUB_TICK_NS
}

/// Ordered state chain for a pulse of `width_ns` starting `delay_ns` after
/// the chain is entered. Both values are on the 4 ns grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulsePlan {
    symbols: Vec<PulseSymbol>,
}

impl PulsePlan {
    pub fn new(delay_ns: u64, width_ns: u64) -> Result<Self, ParameterError> {
        let mut symbols = Vec::with_capacity(4);
        // A delay fragment already spends 4 ns at pulse voltage.
        let mut width = width_ns as i64;

        if delay_ns >= TICK_NS {
            symbols.push(PulseSymbol::Wait(Ticks::new(delay_ns / TICK_NS)?));
        }
        if delay_ns % TICK_NS >= SUB_TICK_NS {
            symbols.push(PulseSymbol::WaitFragment);
            width -= SUB_TICK_NS as i64;
        }

        let tick = TICK_NS as i64;
        if width >= tick {
            symbols.push(PulseSymbol::Pulse(Ticks::new((width / tick) as u64)?));
        }
        if width > 0 && width % tick >= SUB_TICK_NS as i64 {
            symbols.push(PulseSymbol::PulseFragment);
        }

        Ok(Self { symbols })
    }

    pub fn symbols(&self) -> &[PulseSymbol] {
        &self.symbols
    }

    /// Number of states the chain allocates.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn count(&self, f: impl Fn(&PulseSymbol) -> bool) -> usize {
        self.symbols.iter().filter(|s| f(s)).count()
    }

    /// States spent before the pulse begins.
    pub fn delay_states(&self) -> usize {
        self.count(|s| matches!(s, PulseSymbol::Wait(_) | PulseSymbol::WaitFragment))
    }

    pub fn fragment_states(&self) -> usize {
        self.count(|s| matches!(s, PulseSymbol::WaitFragment | PulseSymbol::PulseFragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PulseSymbol::*;

    fn ticks(n: u64) -> Ticks {
        Ticks::new(n).unwrap()
    }

    #[test]
    fn grid_rounds_down_to_four_ns() {
        assert_eq!(to_grid_ns(0.0), 0);
        assert_eq!(to_grid_ns(3e-9), 0);
        assert_eq!(to_grid_ns(6e-9), 4);
        assert_eq!(to_grid_ns(3e-6), 3000);
        assert_eq!(to_grid_ns(43e-9), 40);
        assert_eq!(to_grid_ns(7.6e-9), 4);
        assert_eq!(to_grid_ns(11.9e-9), 8);
    }

    #[test]
    fn just_under_a_tick_delay_stays_a_fragment() {
        let plan = PulsePlan::new(to_grid_ns(7.6e-9), 40).unwrap();
        assert_eq!(plan.symbols(), &[WaitFragment, Pulse(ticks(4)), PulseFragment]);
    }

    #[test]
    fn zero_delay_has_no_delay_states() {
        let plan = PulsePlan::new(0, 40).unwrap();
        assert_eq!(plan.delay_states(), 0);
        assert_eq!(plan.symbols(), &[Pulse(ticks(5))]);
    }

    #[test]
    fn sub_tick_delay_is_one_fragment() {
        let plan = PulsePlan::new(4, 40).unwrap();
        assert_eq!(plan.delay_states(), 1);
        assert_eq!(plan.fragment_states(), 2);
        // 4 ns of the width is spent in the delay fragment.
        assert_eq!(plan.symbols(), &[WaitFragment, Pulse(ticks(4)), PulseFragment]);
    }

    #[test]
    fn twelve_ns_delay_is_wait_and_fragment() {
        let plan = PulsePlan::new(12, 8).unwrap();
        assert_eq!(plan.delay_states(), 2);
        assert_eq!(plan.symbols(), &[Wait(ticks(1)), WaitFragment, PulseFragment]);
    }

    #[test]
    fn whole_tick_delay_has_no_fragment() {
        let plan = PulsePlan::new(16, 16).unwrap();
        assert_eq!(plan.delay_states(), 1);
        assert_eq!(plan.fragment_states(), 0);
        assert_eq!(plan.symbols(), &[Wait(ticks(2)), Pulse(ticks(2))]);
    }

    #[test]
    fn width_consumed_by_delay_fragment_leaves_no_pulse_state() {
        let plan = PulsePlan::new(4, 4).unwrap();
        assert_eq!(plan.symbols(), &[WaitFragment]);

        let plan = PulsePlan::new(4, 0).unwrap();
        assert_eq!(plan.symbols(), &[WaitFragment]);
    }

    #[test]
    fn empty_plan() {
        assert!(PulsePlan::new(0, 0).unwrap().is_empty());
    }

    #[test]
    fn long_pulse() {
        let plan = PulsePlan::new(3000, 44).unwrap();
        assert_eq!(plan.symbols(), &[Wait(ticks(375)), Pulse(ticks(5)), PulseFragment]);
        assert_eq!(plan.len(), 3);
    }
}
