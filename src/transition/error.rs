//! Parameter errors raised before any wire traffic.

use thiserror::Error;

/// A rejected parameter. Raised by precondition checks; never partially applied.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParameterError {
    #[error("Invalid pin index {pin}. Valid range {min} ~ {max} inclusive")]
    PinOutOfRange { pin: u8, min: u8, max: u8 },

    #[error("Invalid voltage {volts} V. Valid range {min} ~ {max} inclusive")]
    VoltageOutOfRange { volts: f64, min: f64, max: f64 },

    #[error("Invalid time {seconds} s. Valid range {min} ~ {max} inclusive")]
    TimeOutOfRange { seconds: f64, min: f64, max: f64 },

    #[error("Invalid cycle count {cycles}. Valid range {min} ~ {max} inclusive")]
    CyclesOutOfRange { cycles: u64, min: u64, max: u64 },

    #[error("Invalid visit count {count}. Valid range {min} ~ {max} inclusive")]
    VisitCountOutOfRange { count: u64, min: u64, max: u64 },

    #[error("Invalid trigger wait count {count}. Valid range {min} ~ {max} inclusive")]
    TriggerCountOutOfRange { count: u32, min: u32, max: u32 },

    #[error("Invalid power percentage {percent}. Valid range 0 ~ 100 inclusive")]
    PowerOutOfRange { percent: u8 },

    #[error("Invalid slow voltage output {output}. Valid range 0 ~ {max} inclusive")]
    SlowOutputOutOfRange { output: u8, max: u8 },

    #[error("Data pattern of {len} bytes exceeds the maximum of {max}")]
    PatternTooLong { len: usize, max: usize },
}
