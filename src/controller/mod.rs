//! Execution controller: arm, start, wait and record glitch trials.
//!
//! # Example
//!
//! ```rust
//! use chronoglitch::chronology::Chronology;
//! use chronoglitch::config::{ControllerConfig, LinkConfig};
//! use chronoglitch::controller::{GlitchParams, PulseShape, TrialRunner};
//! use chronoglitch::link::sim::SimulatedDevice;
//! use chronoglitch::link::DeviceLink;
//!
//! let link = DeviceLink::open(SimulatedDevice::new(), &LinkConfig::default()).unwrap();
//! let mut runner = TrialRunner::new(Chronology::new(link).unwrap(), ControllerConfig::default());
//!
//! let params = GlitchParams::new(PulseShape::new(1.5, 3e-6, 40e-9));
//! let record = runner.run_glitch(&params).unwrap();
//! assert!(!record.timed_out);
//! assert_eq!(runner.history().len(), 1);
//! ```

mod history;

pub use history::{TrialHistory, TrialRecord};

use crate::chronology::{Chronology, ChronologyError};
use crate::config::ControllerConfig;
use crate::core::{Edge, PulseChannel};
use crate::link::Transport;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Voltage and timing of one pulse.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PulseShape {
    pub volts: f64,
    pub delay_s: f64,
    pub width_s: f64,
}

impl PulseShape {
    pub fn new(volts: f64, delay_s: f64, width_s: f64) -> Self {
        Self {
            volts,
            delay_s,
            width_s,
        }
    }
}

/// The standard program: wait for one rising edge on the trigger pin, then
/// pulse. An optional second trigger and pulse follow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlitchParams {
    pub channel: PulseChannel,
    pub first: PulseShape,
    pub second: Option<PulseShape>,
    /// When false only the trigger waits are armed, for reference runs.
    pub enabled: bool,
}

impl GlitchParams {
    pub fn new(first: PulseShape) -> Self {
        Self {
            channel: PulseChannel::Ch1,
            first,
            second: None,
            enabled: true,
        }
    }

    pub fn with_channel(mut self, channel: PulseChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_second(mut self, second: PulseShape) -> Self {
        self.second = Some(second);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Append the program to `chronology` without starting it.
    pub fn build<T: Transport>(
        &self,
        chronology: &mut Chronology<T>,
        trigger_pin: u8,
    ) -> Result<(), ChronologyError> {
        for shape in std::iter::once(&self.first).chain(self.second.as_ref()) {
            chronology.wait_trigger(trigger_pin, Edge::Rising, 1)?;
            if self.enabled {
                chronology.pulse(self.channel, shape.volts, shape.delay_s, shape.width_s)?;
            }
        }
        Ok(())
    }
}

pub struct TrialRunner<T: Transport> {
    chronology: Chronology<T>,
    config: ControllerConfig,
    history: TrialHistory,
}

impl<T: Transport> TrialRunner<T> {
    pub fn new(chronology: Chronology<T>, config: ControllerConfig) -> Self {
        Self {
            chronology,
            config,
            history: TrialHistory::new(),
        }
    }

    pub fn chronology(&self) -> &Chronology<T> {
        &self.chronology
    }

    pub fn chronology_mut(&mut self) -> &mut Chronology<T> {
        &mut self.chronology
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn history(&self) -> &TrialHistory {
        &self.history
    }

    pub fn into_chronology(self) -> Chronology<T> {
        self.chronology
    }

    /// Forget the previous program, rebuild with `params` and start it.
    pub fn arm_glitch(&mut self, params: &GlitchParams) -> Result<(), ChronologyError> {
        self.chronology.forget()?;
        params.build(&mut self.chronology, self.config.trigger_pin)?;
        self.chronology.start()
    }

    /// Forget, let `arm` build the program, start it and wait for it to finish.
    ///
    /// The outcome is appended to the history and returned.
    pub fn run_trial<F>(&mut self, arm: F) -> Result<TrialRecord, ChronologyError>
    where
        F: FnOnce(&mut Chronology<T>) -> Result<(), ChronologyError>,
    {
        self.chronology.forget()?;
        arm(&mut self.chronology)?;

        let started_at = Utc::now();
        self.chronology.start()?;
        let timed_out = self
            .chronology
            .wait_until_finish(self.config.finish_timeout_ms)?;
        let finished_at = Utc::now();
        let final_state = self.chronology.current_state()?;

        let record = TrialRecord {
            id: Uuid::new_v4(),
            started_at,
            finished_at,
            timed_out,
            final_state,
            states: self.chronology.steps().len(),
        };
        info!(trial = %record.id, timed_out, %final_state, "trial finished");
        self.history = self.history.record(record.clone());
        Ok(record)
    }

    /// Run one trial of the standard glitch program.
    pub fn run_glitch(&mut self, params: &GlitchParams) -> Result<TrialRecord, ChronologyError> {
        let pin = self.config.trigger_pin;
        self.run_trial(|chronology| params.build(chronology, pin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chronology::StepLabel;
    use crate::config::LinkConfig;
    use crate::core::{Core, StateId};
    use crate::link::sim::{SimulatedDevice, TriggerMode};
    use crate::link::DeviceLink;

    fn runner(device: SimulatedDevice) -> TrialRunner<SimulatedDevice> {
        let link = DeviceLink::open(device, &LinkConfig::default()).unwrap();
        TrialRunner::new(Chronology::new(link).unwrap(), ControllerConfig::default())
    }

    fn params() -> GlitchParams {
        GlitchParams::new(PulseShape::new(1.5, 3e-6, 40e-9))
    }

    #[test]
    fn build_waits_on_configured_pin_then_pulses() {
        let mut runner = runner(SimulatedDevice::new());
        runner.arm_glitch(&params()).unwrap();

        let steps = runner.chronology().steps();
        assert!(matches!(
            steps[0].label,
            StepLabel::WaitTrigger {
                pin: 8,
                edge: Edge::Rising,
                count: 1
            }
        ));
        assert!(matches!(steps[1].label, StepLabel::Pulse { .. }));
        assert!(runner.chronology().link().transport().is_running(Core::One));
    }

    #[test]
    fn second_pulse_adds_second_trigger() {
        let mut runner = runner(SimulatedDevice::new());
        let params = params().with_second(PulseShape::new(-1.0, 0.0, 16e-9));
        runner.arm_glitch(&params).unwrap();

        let triggers = runner
            .chronology()
            .steps()
            .iter()
            .filter(|s| matches!(s.label, StepLabel::WaitTrigger { .. }))
            .count();
        assert_eq!(triggers, 2);
    }

    #[test]
    fn disabled_glitch_only_waits() {
        let mut runner = runner(SimulatedDevice::new());
        runner.arm_glitch(&params().disabled()).unwrap();
        assert_eq!(runner.chronology().steps().len(), 2);
    }

    #[test]
    fn completed_trial_is_recorded() {
        let mut runner = runner(SimulatedDevice::new());
        let record = runner.run_glitch(&params()).unwrap();

        assert!(!record.timed_out);
        assert_eq!(record.states, 4);
        assert_eq!(
            Some(record.final_state),
            runner.chronology().states().last().copied()
        );
        assert_eq!(runner.history().last(), Some(&record));
    }

    #[test]
    fn missing_trigger_times_out() {
        let mut runner = runner(SimulatedDevice::new().with_triggers(TriggerMode::External));
        let record = runner.run_glitch(&params()).unwrap();

        assert!(record.timed_out);
        assert_eq!(record.final_state, runner.chronology().states()[0]);
        assert_eq!(runner.history().timeouts(), 1);
    }

    #[test]
    fn repeated_trials_reuse_the_same_states() {
        let mut runner = runner(SimulatedDevice::new());
        runner.run_glitch(&params()).unwrap();
        let first: Vec<StateId> = runner.chronology().states();
        runner.run_glitch(&params()).unwrap();

        assert_eq!(runner.chronology().states(), first);
        assert_eq!(runner.history().len(), 2);
    }
}
