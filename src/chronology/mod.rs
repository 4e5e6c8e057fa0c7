//! Chronology compiler: linear glitch programs built verb by verb.
//!
//! A [`Chronology`] owns a [`DeviceLink`] and compiles each verb straight
//! onto the device. The program is a single chain of states. The last state
//! of the chain is the *tail*. A verb configures the tail's action, appends
//! a new state and wires the tail to it, so the new state becomes the tail.
//!
//! Two extra states are reserved per chronology. *now* carries immediate
//! output changes: it is configured, wired back to the current state with a
//! one-tick transition and forced. *idle* is where the FSM parks after
//! [`Chronology::forget`].
//!
//! Every verb validates all of its parameters before it sends anything.
//!
//! # Example
//!
//! ```rust
//! use chronoglitch::chronology::Chronology;
//! use chronoglitch::config::LinkConfig;
//! use chronoglitch::core::{Edge, PulseChannel};
//! use chronoglitch::link::sim::SimulatedDevice;
//! use chronoglitch::link::DeviceLink;
//!
//! let link = DeviceLink::open(SimulatedDevice::new(), &LinkConfig::default()).unwrap();
//! let mut chronology = Chronology::new(link).unwrap();
//!
//! chronology.wait_trigger(8, Edge::Rising, 1).unwrap();
//! chronology.pulse(PulseChannel::Ch1, 1.5, 3e-6, 40e-9).unwrap();
//! chronology.start().unwrap();
//!
//! let timed_out = chronology.wait_until_finish(100).unwrap();
//! assert!(!timed_out);
//! ```

pub mod error;
pub mod pulse;
mod step;
mod validate;

pub use error::ChronologyError;
pub use pulse::{PulsePlan, PulseSymbol};
pub use step::{ChronologyListing, Step, StepLabel};
pub use validate::{MAX_POWER_PERCENT, MAX_TRIGGER_COUNT, MIN_TRIGGER_COUNT};

use crate::core::{Edge, Level, Priority, PulseChannel, StateId};
use crate::link::codec::{Ticks, MAX_LOGIC_LEVEL};
use crate::link::{DeviceLink, LinkError, Transport};
use crate::pool::StatePool;
use crate::transition::{Condition, Transition};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct Chronology<T: Transport> {
    link: DeviceLink<T>,
    pool: StatePool,
    steps: Vec<Step>,
    now_state: StateId,
    idle_state: StateId,
    rest_voltage: [f64; 2],
    started: bool,
}

impl<T: Transport> Chronology<T> {
    /// Reserve the now and idle states on the link's core.
    pub fn new(mut link: DeviceLink<T>) -> Result<Self, ChronologyError> {
        let mut pool = StatePool::new();
        let reserved = pool.allocate(&mut link, 2)?;
        let (now_state, idle_state) = (reserved[0], reserved[1]);
        debug!(core = %link.core(), %now_state, %idle_state, "reserved chronology states");
        Ok(Self {
            link,
            pool,
            steps: Vec::new(),
            now_state,
            idle_state,
            rest_voltage: [0.0; 2],
            started: false,
        })
    }

    pub fn link(&self) -> &DeviceLink<T> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink<T> {
        &mut self.link
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Sequence states in program order.
    pub fn states(&self) -> Vec<StateId> {
        self.steps.iter().map(|step| step.state).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the sequence was started and has not been seen to finish.
    pub fn is_running(&self) -> bool {
        self.started
    }

    pub fn now_state(&self) -> StateId {
        self.now_state
    }

    pub fn idle_state(&self) -> StateId {
        self.idle_state
    }

    /// Voltage a pulse on `channel` returns to.
    pub fn rest_voltage(&self, channel: PulseChannel) -> f64 {
        self.rest_voltage[channel.index()]
    }

    fn program(&mut self, transition: Transition) -> Result<(), ChronologyError> {
        let commands = transition.encode()?;
        self.link.execute(&commands)?;
        Ok(())
    }

    fn step_after(&mut self, src: StateId, dst: StateId, ticks: Ticks) -> Result<(), ChronologyError> {
        self.program(Transition::new(
            src,
            Priority::High,
            dst,
            Condition::Elapsed(ticks),
        ))
    }

    /// Label the tail and append `n` states labelled `added` after it.
    ///
    /// The states, plus the tail itself when the sequence is empty, come
    /// from a single allocation. If the pool is exhausted the sequence is
    /// left exactly as it was.
    fn extend(
        &mut self,
        label: StepLabel,
        n: usize,
        added: StepLabel,
    ) -> Result<(StateId, Vec<StateId>), ChronologyError> {
        let needs_tail = usize::from(self.steps.is_empty());
        let mut states = self.pool.allocate(&mut self.link, n + needs_tail)?;
        let tail = match self.steps.pop() {
            Some(step) => step.state,
            None => states.remove(0),
        };
        self.steps.push(Step { state: tail, label });
        self.steps.extend(states.iter().map(|&state| Step {
            state,
            label: added.clone(),
        }));
        Ok((tail, states))
    }

    /// Label the tail and append one fresh state. Returns (tail, next).
    fn advance(&mut self, label: StepLabel) -> Result<(StateId, StateId), ChronologyError> {
        let (tail, states) = self.extend(label, 1, StepLabel::Nop)?;
        Ok((tail, states[0]))
    }

    /// Configure the now state, wire it back to the current state and force it.
    fn apply_now<F>(&mut self, configure: F) -> Result<(), ChronologyError>
    where
        F: FnOnce(&mut DeviceLink<T>, StateId) -> Result<(), LinkError>,
    {
        if self.started {
            warn!(
                core = %self.link.core(),
                "immediate output change while a sequence may be running"
            );
        }
        let current = self.link.current_state()?;
        let now = self.now_state;
        configure(&mut self.link, now)?;
        self.step_after(now, current, Ticks::ONE)?;
        self.link.force_state(now)?;
        Ok(())
    }

    /// Drive `pin` to `level` when the sequence reaches this step.
    #[instrument(skip(self), level = "debug")]
    pub fn set_output(&mut self, pin: u8, level: Level) -> Result<(), ChronologyError> {
        validate::all(vec![validate::pin(pin)])?;
        let (tail, next) = self.advance(StepLabel::SetOutput { pin, level })?;
        let mask = 1u32 << pin;
        match level {
            Level::High => self.link.set_bits(tail, mask)?,
            Level::Low => self.link.clear_bits(tail, mask)?,
        }
        self.step_after(tail, next, Ticks::ONE)
    }

    /// Drive `pin` to `level` immediately. Not safe while a sequence runs.
    #[instrument(skip(self), level = "debug")]
    pub fn set_output_now(&mut self, pin: u8, level: Level) -> Result<(), ChronologyError> {
        validate::all(vec![validate::pin(pin)])?;
        let mask = 1u32 << pin;
        self.apply_now(|link, now| match level {
            Level::High => link.set_bits(now, mask),
            Level::Low => link.clear_bits(now, mask),
        })
    }

    /// Wait for `count` edges on `pin`.
    ///
    /// Returns the waiting state. While [`Chronology::current_state`] still
    /// equals it, the trigger has not fired yet.
    #[instrument(skip(self), level = "debug")]
    pub fn wait_trigger(&mut self, pin: u8, edge: Edge, count: u32) -> Result<StateId, ChronologyError> {
        validate::all(vec![validate::pin(pin), validate::trigger_count(count)])?;
        let (tail, next) = self.advance(StepLabel::WaitTrigger { pin, edge, count })?;
        self.program(Transition::new(
            tail,
            Priority::Low,
            tail,
            Condition::Edge { pin, edge },
        ))?;
        // Entering the waiting state counts as one visit.
        self.program(Transition::new(
            tail,
            Priority::High,
            next,
            Condition::Visits {
                count: u64::from(count) + 1,
            },
        ))?;
        debug!(state = %tail, "trigger wait compiled");
        Ok(tail)
    }

    /// Hold the sequence for `seconds`, rounded down to whole ticks.
    #[instrument(skip(self), level = "debug")]
    pub fn wait_time(&mut self, seconds: f64) -> Result<(), ChronologyError> {
        validate::all(vec![validate::wait_seconds(seconds)])?;
        let ticks = Ticks::from_seconds(seconds)?;
        let (tail, next) = self.advance(StepLabel::WaitTime { seconds })?;
        self.step_after(tail, next, ticks)
    }

    /// Set `channel` to `volts` at this step and remember it as the rest voltage.
    #[instrument(skip(self), level = "debug")]
    pub fn set_pulse_voltage(&mut self, channel: PulseChannel, volts: f64) -> Result<(), ChronologyError> {
        validate::all(vec![validate::rest_voltage(volts)])?;
        let (tail, next) = self.advance(StepLabel::SetPulseVoltage { channel, volts })?;
        self.link.set_pulse_voltage(tail, channel, volts, volts)?;
        self.step_after(tail, next, Ticks::ONE)?;
        self.rest_voltage[channel.index()] = volts;
        Ok(())
    }

    /// Set `channel` to `volts` immediately and remember it as the rest voltage.
    #[instrument(skip(self), level = "debug")]
    pub fn set_pulse_voltage_now(&mut self, channel: PulseChannel, volts: f64) -> Result<(), ChronologyError> {
        validate::all(vec![validate::rest_voltage(volts)])?;
        self.apply_now(|link, now| link.set_pulse_voltage(now, channel, volts, volts))?;
        self.rest_voltage[channel.index()] = volts;
        Ok(())
    }

    /// Set `channel` to `volts` immediately, leaving the rest voltage alone.
    #[instrument(skip(self), level = "debug")]
    pub fn set_pulse_output_now(&mut self, channel: PulseChannel, volts: f64) -> Result<(), ChronologyError> {
        validate::all(vec![validate::pulse_voltage(volts)])?;
        self.apply_now(|link, now| link.set_pulse_voltage(now, channel, volts, volts))
    }

    /// Set slow output `output` to `percent` of the logic level and commit it.
    ///
    /// Goes through the analog output block, not the FSM, so it is safe while
    /// a sequence runs.
    #[instrument(skip(self), level = "debug")]
    pub fn set_power_now(&mut self, output: u8, percent: u8) -> Result<(), ChronologyError> {
        validate::all(vec![
            validate::slow_output(output),
            validate::power_percent(percent),
        ])?;
        let volts = MAX_LOGIC_LEVEL * f64::from(percent) / f64::from(MAX_POWER_PERCENT);
        self.link.set_slow_voltage(output, volts)?;
        self.link.commit_slow_voltage()?;
        Ok(())
    }

    /// Apply `volts` on `channel` for `width_s`, starting `delay_s` after this
    /// step is reached, then return to the rest voltage.
    ///
    /// Both times are rounded down to 4 ns.
    #[instrument(skip(self), level = "debug")]
    pub fn pulse(
        &mut self,
        channel: PulseChannel,
        volts: f64,
        delay_s: f64,
        width_s: f64,
    ) -> Result<(), ChronologyError> {
        validate::all(vec![
            validate::pulse_voltage(volts),
            validate::pulse_seconds(delay_s),
            validate::pulse_seconds(width_s),
        ])?;
        let plan = PulsePlan::new(pulse::to_grid_ns(delay_s), pulse::to_grid_ns(width_s))?;
        let (tail, states) = self.extend(
            StepLabel::Pulse {
                channel,
                volts,
                delay_s,
                width_s,
            },
            plan.len(),
            StepLabel::ContinuedPulse,
        )?;

        let rest = self.rest_voltage[channel.index()];
        let mut src = tail;
        for (&symbol, &dst) in plan.symbols().iter().zip(&states) {
            self.program(Transition::disabled(src, Priority::Low))?;
            let ticks = match symbol {
                PulseSymbol::Wait(ticks) => ticks,
                PulseSymbol::WaitFragment => {
                    self.link.set_pulse_voltage(src, channel, rest, volts)?;
                    Ticks::ONE
                }
                PulseSymbol::Pulse(ticks) => {
                    self.link.set_pulse_voltage(src, channel, volts, volts)?;
                    ticks
                }
                PulseSymbol::PulseFragment => {
                    self.link.set_pulse_voltage(src, channel, volts, rest)?;
                    Ticks::ONE
                }
            };
            self.step_after(src, dst, ticks)?;
            src = dst;
        }
        if let Some(&last) = states.last() {
            self.link.set_pulse_voltage(last, channel, rest, rest)?;
        }
        debug!(states = states.len(), symbols = ?plan.symbols(), "pulse compiled");
        Ok(())
    }

    /// Run the FSM and jump to the first state. Does nothing for an empty sequence.
    pub fn start(&mut self) -> Result<(), ChronologyError> {
        let Some(first) = self.steps.first().map(|step| step.state) else {
            return Ok(());
        };
        self.link.run()?;
        self.link.force_state(first)?;
        self.started = true;
        info!(core = %self.link.core(), %first, states = self.steps.len(), "sequence started");
        Ok(())
    }

    /// Busy-poll until the last state is reached.
    ///
    /// Returns `true` if `timeout_ms` elapsed first. An empty sequence returns
    /// `false` at once.
    pub fn wait_until_finish(&mut self, timeout_ms: u64) -> Result<bool, ChronologyError> {
        let Some(last) = self.steps.last().map(|step| step.state) else {
            return Ok(false);
        };
        let reached = self
            .link
            .wait_until_state(last, Duration::from_millis(timeout_ms))?;
        if reached {
            self.started = false;
        } else {
            warn!(core = %self.link.core(), %last, timeout_ms, "sequence did not finish");
        }
        Ok(!reached)
    }

    /// State the FSM is in. Advisory while a sequence runs.
    pub fn current_state(&mut self) -> Result<StateId, ChronologyError> {
        Ok(self.link.current_state()?)
    }

    /// Free the sequence, park the FSM in the idle state and let it run.
    pub fn forget(&mut self) -> Result<(), ChronologyError> {
        // A step is dropped only once its state is freed.
        while let Some(step) = self.steps.last() {
            let state = step.state;
            self.pool.free(&mut self.link, state)?;
            self.steps.pop();
        }
        StatePool::reset_rules(&mut self.link, self.now_state)?;
        self.link.force_state(self.idle_state)?;
        self.link.sync()?;
        self.link.run()?;
        self.started = false;
        debug!(core = %self.link.core(), "sequence forgotten");
        Ok(())
    }

    pub fn listing(&self) -> ChronologyListing {
        ChronologyListing {
            core: self.link.core(),
            created_at: Utc::now(),
            steps: self.steps.clone(),
        }
    }

    /// Forget the sequence, free the reserved states and hand back the link.
    pub fn release(mut self) -> Result<DeviceLink<T>, ChronologyError> {
        self.forget()?;
        let (now, idle) = (self.now_state, self.idle_state);
        self.pool.free(&mut self.link, now)?;
        self.pool.free(&mut self.link, idle)?;
        Ok(self.link)
    }
}
