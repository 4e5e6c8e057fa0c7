//! Fixed-point encodings for times and voltages.
//!
//! These are interoperability constants of the device, not tunables.

use crate::transition::ParameterError;
use serde::{Deserialize, Serialize};

/// Native FSM timing unit in nanoseconds.
pub const TICK_NS: u64 = 8;

/// Pulse-edge resolution reachable with fragment states.
pub const SUB_TICK_NS: u64 = 4;

/// One tick in seconds.
pub const TICK_SECONDS: f64 = 8e-9;

/// Shortest time a timer transition can express.
pub const MIN_SECONDS: f64 = TICK_SECONDS;

/// Longest time a timer transition is allowed to express.
pub const MAX_SECONDS: f64 = 34.0;

pub const MIN_CYCLES: u64 = 1;
pub const MAX_CYCLES: u64 = 1 << 32;

/// Pulse channels swing between `-PULSE_FULL_SCALE` and `+PULSE_FULL_SCALE`.
pub const PULSE_FULL_SCALE: f64 = 4.0;

/// Slow analog outputs span 0 ~ `SLOW_FULL_SCALE` volts with 12-bit resolution.
pub const SLOW_FULL_SCALE: f64 = 5.0;

/// Highest logic level the I/O bank accepts.
pub const MAX_LOGIC_LEVEL: f64 = 3.3;

const SLOW_CODE_MAX: f64 = 4095.0;
const LOGIC_CODE_MAX: f64 = 65535.0;

// Absorbs float noise such as 16e-9 / 8e-9 == 1.9999999999999998.
const TICK_ROUNDING_SLACK: f64 = 1e-6;

/// A duration expressed in whole device ticks, `1 ..= 2^32`.
///
/// The device stores `ticks - 1` in its timer-overflow register.
///
/// # Example
///
/// ```rust
/// use chronoglitch::link::codec::Ticks;
///
/// let ticks = Ticks::from_seconds(3e-6).unwrap();
/// assert_eq!(ticks.get(), 375);
/// assert_eq!(ticks.register(), 374);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Ticks(u64);

impl Ticks {
    /// One tick, the shortest expressible transition time.
    pub const ONE: Ticks = Ticks(1);

    pub fn new(cycles: u64) -> Result<Self, ParameterError> {
        if (MIN_CYCLES..=MAX_CYCLES).contains(&cycles) {
            Ok(Ticks(cycles))
        } else {
            Err(ParameterError::CyclesOutOfRange {
                cycles,
                min: MIN_CYCLES,
                max: MAX_CYCLES,
            })
        }
    }

    /// Convert seconds to ticks, rounding down to a whole tick.
    pub fn from_seconds(seconds: f64) -> Result<Self, ParameterError> {
        if !(MIN_SECONDS..=MAX_SECONDS).contains(&seconds) {
            return Err(ParameterError::TimeOutOfRange {
                seconds,
                min: MIN_SECONDS,
                max: MAX_SECONDS,
            });
        }
        let cycles = (seconds / TICK_SECONDS + TICK_ROUNDING_SLACK).floor() as u64;
        Ticks::new(cycles.max(MIN_CYCLES))
    }

    /// Rebuild from a timer register value.
    pub fn from_register(register: u32) -> Self {
        Ticks(u64::from(register) + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Value written to the timer-overflow register.
    pub fn register(self) -> u32 {
        // 1 ..= 2^32 maps onto the full u32 range.
        (self.0 - 1) as u32
    }

    pub fn as_seconds(self) -> f64 {
        self.0 as f64 * TICK_SECONDS
    }
}

impl TryFrom<u64> for Ticks {
    type Error = ParameterError;

    fn try_from(cycles: u64) -> Result<Self, Self::Error> {
        Ticks::new(cycles)
    }
}

impl From<Ticks> for u64 {
    fn from(ticks: Ticks) -> Self {
        ticks.0
    }
}

fn check_volts(volts: f64, min: f64, max: f64) -> Result<(), ParameterError> {
    if (min..=max).contains(&volts) {
        Ok(())
    } else {
        Err(ParameterError::VoltageOutOfRange { volts, min, max })
    }
}

/// Encode a pulse-channel voltage as a signed 16-bit fraction of full scale.
///
/// Positive values scale by 32767, negative values by 32768, so both ends of
/// the range map onto the extremes of `i16`.
pub fn encode_pulse_voltage(volts: f64) -> Result<i16, ParameterError> {
    check_volts(volts, -PULSE_FULL_SCALE, PULSE_FULL_SCALE)?;
    let code = if volts >= 0.0 {
        (volts / PULSE_FULL_SCALE * 32767.0).round()
    } else {
        (volts / PULSE_FULL_SCALE * 32768.0).round()
    };
    Ok(code as i16)
}

pub fn decode_pulse_voltage(code: i16) -> f64 {
    if code >= 0 {
        f64::from(code) / 32767.0 * PULSE_FULL_SCALE
    } else {
        f64::from(code) / 32768.0 * PULSE_FULL_SCALE
    }
}

/// Encode a slow analog output voltage as a 12-bit code.
pub fn encode_slow_voltage(volts: f64) -> Result<u16, ParameterError> {
    check_volts(volts, 0.0, SLOW_FULL_SCALE)?;
    Ok((volts / SLOW_FULL_SCALE * SLOW_CODE_MAX).round() as u16)
}

pub fn decode_slow_voltage(code: u16) -> f64 {
    f64::from(code) / SLOW_CODE_MAX * SLOW_FULL_SCALE
}

/// Encode the I/O bank logic level as a 16-bit fraction of 5.0 V.
pub fn encode_logic_level(volts: f64) -> Result<u16, ParameterError> {
    check_volts(volts, 0.0, MAX_LOGIC_LEVEL)?;
    Ok((volts / SLOW_FULL_SCALE * LOGIC_CODE_MAX).round() as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_tick_is_minimum_time() {
        let ticks = Ticks::from_seconds(MIN_SECONDS).unwrap();
        assert_eq!(ticks, Ticks::ONE);
        assert_eq!(ticks.register(), 0);
    }

    #[test]
    fn whole_tick_multiples_are_exact() {
        assert_eq!(Ticks::from_seconds(16e-9).unwrap().get(), 2);
        assert_eq!(Ticks::from_seconds(24e-9).unwrap().get(), 3);
        assert_eq!(Ticks::from_seconds(1e-3).unwrap().get(), 125_000);
    }

    #[test]
    fn partial_ticks_round_down() {
        assert_eq!(Ticks::from_seconds(15e-9).unwrap().get(), 1);
        assert_eq!(Ticks::from_seconds(20e-9).unwrap().get(), 2);
    }

    #[test]
    fn maximum_time_fits_the_register() {
        let ticks = Ticks::from_seconds(MAX_SECONDS).unwrap();
        assert_eq!(ticks.register(), 4_249_999_999);
    }

    #[test]
    fn out_of_range_times_are_rejected() {
        assert!(matches!(
            Ticks::from_seconds(0.0),
            Err(ParameterError::TimeOutOfRange { .. })
        ));
        assert!(Ticks::from_seconds(34.5).is_err());
        assert!(Ticks::from_seconds(f64::NAN).is_err());
    }

    #[test]
    fn cycle_bounds() {
        assert!(Ticks::new(0).is_err());
        assert_eq!(Ticks::new(MAX_CYCLES).unwrap().register(), u32::MAX);
        assert!(Ticks::new(MAX_CYCLES + 1).is_err());
        assert_eq!(Ticks::from_register(0), Ticks::ONE);
    }

    #[test]
    fn longest_time_stays_below_visit_limit_range() {
        let ticks = Ticks::from_seconds(MAX_SECONDS).unwrap();
        assert!(ticks.get() <= MAX_CYCLES - 2);
    }

    #[test]
    fn deserialize_rejects_out_of_range_cycles() {
        assert_eq!(serde_json::from_str::<Ticks>("375").unwrap(), Ticks::new(375).unwrap());
        assert!(serde_json::from_str::<Ticks>("0").is_err());
        assert!(serde_json::from_str::<Ticks>(&(MAX_CYCLES + 1).to_string()).is_err());
        assert_eq!(serde_json::to_string(&Ticks::ONE).unwrap(), "1");
    }

    #[test]
    fn pulse_voltage_extremes() {
        assert_eq!(encode_pulse_voltage(4.0).unwrap(), i16::MAX);
        assert_eq!(encode_pulse_voltage(-4.0).unwrap(), i16::MIN);
        assert_eq!(encode_pulse_voltage(0.0).unwrap(), 0);
        assert_eq!(encode_pulse_voltage(1.5).unwrap(), 12288);
    }

    #[test]
    fn pulse_voltage_out_of_range() {
        assert!(matches!(
            encode_pulse_voltage(4.01),
            Err(ParameterError::VoltageOutOfRange { .. })
        ));
        assert!(encode_pulse_voltage(-4.2).is_err());
    }

    #[test]
    fn pulse_voltage_decodes_within_one_lsb() {
        for volts in [-3.3, -1.0, -0.001, 0.0, 0.25, 1.8, 3.999] {
            let code = encode_pulse_voltage(volts).unwrap();
            let back = decode_pulse_voltage(code);
            assert!((back - volts).abs() <= PULSE_FULL_SCALE / 32768.0);
        }
    }

    #[test]
    fn slow_voltage_is_twelve_bit() {
        assert_eq!(encode_slow_voltage(5.0).unwrap(), 4095);
        assert_eq!(encode_slow_voltage(0.0).unwrap(), 0);
        assert_eq!(encode_slow_voltage(3.3).unwrap(), 2703);
        assert!(encode_slow_voltage(5.1).is_err());
        assert!((decode_slow_voltage(4095) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn logic_level_range() {
        assert_eq!(encode_logic_level(0.0).unwrap(), 0);
        assert_eq!(encode_logic_level(2.5).unwrap(), 32768);
        assert!(encode_logic_level(3.4).is_err());
    }
}
