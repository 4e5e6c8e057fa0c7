//! Precondition checks for chronology verbs.
//!
//! Each check is a `Validation`, so a verb reports every bad parameter at
//! once and sends nothing when any of them fails.

use crate::chronology::ChronologyError;
use crate::link::codec::{MAX_SECONDS, MIN_SECONDS, PULSE_FULL_SCALE};
use crate::link::MAX_SLOW_OUTPUT;
use crate::transition::{check_pin, ParameterError};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

pub(crate) type Check = Validation<(), NonEmptyVec<ParameterError>>;

/// Trigger counts accepted by `wait_trigger`, exclusive on both ends.
pub const MIN_TRIGGER_COUNT: u32 = 0;
pub const MAX_TRIGGER_COUNT: u32 = 0xFFFF_FFFE;

pub const MAX_POWER_PERCENT: u8 = 100;

fn from_result<T>(result: Result<T, ParameterError>) -> Check {
    match result {
        Ok(_) => Validation::success(()),
        Err(error) => Validation::fail(error),
    }
}

pub(crate) fn pin(pin: u8) -> Check {
    from_result(check_pin(pin))
}

fn volts_within(volts: f64, min: f64, max: f64) -> Check {
    if (min..=max).contains(&volts) {
        Validation::success(())
    } else {
        Validation::fail(ParameterError::VoltageOutOfRange { volts, min, max })
    }
}

/// Rest voltage of a pulse channel: 0 to full scale.
pub(crate) fn rest_voltage(volts: f64) -> Check {
    volts_within(volts, 0.0, PULSE_FULL_SCALE)
}

/// Any pulse-channel voltage: plus or minus full scale.
pub(crate) fn pulse_voltage(volts: f64) -> Check {
    volts_within(volts, -PULSE_FULL_SCALE, PULSE_FULL_SCALE)
}

fn seconds_within(seconds: f64, min: f64, max: f64) -> Check {
    if (min..=max).contains(&seconds) {
        Validation::success(())
    } else {
        Validation::fail(ParameterError::TimeOutOfRange { seconds, min, max })
    }
}

/// A wait of at least one tick.
pub(crate) fn wait_seconds(seconds: f64) -> Check {
    seconds_within(seconds, MIN_SECONDS, MAX_SECONDS)
}

/// A pulse delay or width, which may be zero.
pub(crate) fn pulse_seconds(seconds: f64) -> Check {
    seconds_within(seconds, 0.0, MAX_SECONDS)
}

pub(crate) fn trigger_count(count: u32) -> Check {
    if count > MIN_TRIGGER_COUNT && count < MAX_TRIGGER_COUNT {
        Validation::success(())
    } else {
        Validation::fail(ParameterError::TriggerCountOutOfRange {
            count,
            min: MIN_TRIGGER_COUNT + 1,
            max: MAX_TRIGGER_COUNT - 1,
        })
    }
}

pub(crate) fn power_percent(percent: u8) -> Check {
    if percent <= MAX_POWER_PERCENT {
        Validation::success(())
    } else {
        Validation::fail(ParameterError::PowerOutOfRange { percent })
    }
}

pub(crate) fn slow_output(output: u8) -> Check {
    if output <= MAX_SLOW_OUTPUT {
        Validation::success(())
    } else {
        Validation::fail(ParameterError::SlowOutputOutOfRange {
            output,
            max: MAX_SLOW_OUTPUT,
        })
    }
}

/// Accumulate every failure into one error.
pub(crate) fn all(checks: Vec<Check>) -> Result<(), ChronologyError> {
    match Validation::all_vec(checks) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(errors) => Err(ChronologyError::InvalidParameters(
            errors.iter().cloned().collect(),
        )),
    }
}
