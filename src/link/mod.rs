//! Device link: framed command/response exchange with the glitch FSM.
//!
//! The link owns the transport and the selected core. Every core-scoped
//! command is preceded by a select-core frame, so two links on the same
//! transport never depend on each other's selection. All multi-byte values
//! are big-endian.
//!
//! # Example
//!
//! ```rust
//! use chronoglitch::config::LinkConfig;
//! use chronoglitch::core::StateId;
//! use chronoglitch::link::sim::SimulatedDevice;
//! use chronoglitch::link::DeviceLink;
//!
//! let mut link = DeviceLink::open(SimulatedDevice::new(), &LinkConfig::default()).unwrap();
//! link.force_state(StateId::new(3)).unwrap();
//! assert_eq!(link.current_state().unwrap(), StateId::new(3));
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod sim;
pub mod transport;

pub use codec::Ticks;
pub use error::LinkError;
pub use frame::{Command, Opcode};
pub use transport::{StreamTransport, Transport};

use crate::config::LinkConfig;
use crate::core::{Core, Priority, PulseChannel, StateId, MAX_PIN, MIN_PIN};
use crate::transition::ParameterError;
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// Highest index of a slow analog output.
pub const MAX_SLOW_OUTPUT: u8 = 5;

/// Longest data pattern the pattern matcher accepts.
pub const MAX_DATA_PATTERN_LEN: usize = 256;

/// Device firmware (bitstream) version, ordered by (major, minor).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    /// Oldest firmware this crate speaks to.
    pub const MIN_COMPATIBLE: FirmwareVersion = FirmwareVersion::new(1, 4);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for FirmwareVersion {
    fn default() -> Self {
        Self::MIN_COMPATIBLE
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for FirmwareVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| format!("expected 'major.minor', got '{s}'"))?;
        let major = major.trim().parse().map_err(|e| format!("major: {e}"))?;
        let minor = minor.trim().parse().map_err(|e| format!("minor: {e}"))?;
        Ok(Self::new(major, minor))
    }
}

/// Build a 32-bit pin mask, rejecting pins outside `MIN_PIN ..= MAX_PIN`.
pub fn pin_mask(pins: &[u8]) -> Result<u32, ParameterError> {
    pins.iter().try_fold(0u32, |mask, &pin| {
        if (MIN_PIN..=MAX_PIN).contains(&pin) {
            Ok(mask | (1 << pin))
        } else {
            Err(ParameterError::PinOutOfRange {
                pin,
                min: MIN_PIN,
                max: MAX_PIN,
            })
        }
    })
}

fn state_and_word(state: StateId, word: u32) -> [u8; 5] {
    let mut operands = [state.as_u8(), 0, 0, 0, 0];
    BigEndian::write_u32(&mut operands[1..], word);
    operands
}

/// Framed command/response link to one core of the device.
pub struct DeviceLink<T: Transport> {
    transport: T,
    core: Core,
    firmware: FirmwareVersion,
}

impl<T: Transport> DeviceLink<T> {
    /// Open the link: select the core, then read and check the firmware version.
    pub fn open(transport: T, config: &LinkConfig) -> Result<Self, LinkError> {
        let mut link = Self {
            transport,
            core: config.core,
            firmware: FirmwareVersion::new(0, 0),
        };
        link.write(Opcode::SelectCore, &[link.core.id()])?;
        let found = link.firmware_version()?;
        if found < config.min_firmware {
            return Err(LinkError::IncompatibleFirmware {
                found,
                required: config.min_firmware,
            });
        }
        link.firmware = found;
        info!(core = %link.core, firmware = %found, "device link open");
        Ok(link)
    }

    pub fn core(&self) -> Core {
        self.core
    }

    /// Firmware version read when the link was opened.
    pub fn firmware(&self) -> FirmwareVersion {
        self.firmware
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn write(&mut self, opcode: Opcode, operands: &[u8]) -> Result<(), LinkError> {
        let frame = Command::new(opcode, operands).to_bytes();
        trace!(core = %self.core, %opcode, frame = ?frame, "write frame");
        self.transport.write_frame(&frame)?;
        Ok(())
    }

    /// Send one command, selecting the core first when the opcode needs it.
    pub fn send(&mut self, opcode: Opcode, operands: &[u8]) -> Result<(), LinkError> {
        if opcode.is_core_scoped() {
            self.write(Opcode::SelectCore, &[self.core.id()])?;
        }
        self.write(opcode, operands)
    }

    /// Send one command and read a fixed-size response.
    pub fn query(
        &mut self,
        opcode: Opcode,
        operands: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, LinkError> {
        self.send(opcode, operands)?;
        let mut response = vec![0u8; response_len];
        self.transport
            .read_response(&mut response)
            .map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::WouldBlock => LinkError::Timeout { opcode },
                _ => LinkError::Io(e),
            })?;
        trace!(core = %self.core, %opcode, response = ?response, "read response");
        Ok(response)
    }

    /// Send an ordered batch of commands.
    pub fn execute(&mut self, commands: &[Command]) -> Result<(), LinkError> {
        commands
            .iter()
            .try_for_each(|cmd| self.send(cmd.opcode, &cmd.operands))
    }

    /// Release the FSM to free-run.
    pub fn run(&mut self) -> Result<(), LinkError> {
        self.send(Opcode::Run, &[])
    }

    /// Freeze the FSM in its current state.
    pub fn hold(&mut self) -> Result<(), LinkError> {
        self.send(Opcode::Hold, &[])
    }

    /// Jump the FSM to `state`.
    pub fn force_state(&mut self, state: StateId) -> Result<(), LinkError> {
        self.send(Opcode::ForceState, &[state.as_u8()])
    }

    pub fn set_next_state(
        &mut self,
        priority: Priority,
        src: StateId,
        dst: StateId,
    ) -> Result<(), LinkError> {
        self.send(
            Opcode::SetNextState,
            &[priority.wire(), src.as_u8(), dst.as_u8()],
        )
    }

    pub fn set_condition_mode(
        &mut self,
        priority: Priority,
        src: StateId,
        mode: u16,
    ) -> Result<(), LinkError> {
        let [hi, lo] = mode.to_be_bytes();
        self.send(
            Opcode::SetConditionMode,
            &[priority.wire(), src.as_u8(), hi, lo],
        )
    }

    /// Load the timer-overflow register of `state`.
    pub fn set_timer_threshold(&mut self, state: StateId, ticks: Ticks) -> Result<(), LinkError> {
        self.send(
            Opcode::SetTimerThreshold,
            &state_and_word(state, ticks.register()),
        )
    }

    /// Load the visit-threshold register of `state`; `visits` is 1-based.
    pub fn set_visit_threshold(&mut self, state: StateId, visits: u64) -> Result<(), LinkError> {
        if !(codec::MIN_CYCLES..=codec::MAX_CYCLES).contains(&visits) {
            return Err(ParameterError::VisitCountOutOfRange {
                count: visits,
                min: codec::MIN_CYCLES,
                max: codec::MAX_CYCLES,
            }
            .into());
        }
        self.send(
            Opcode::SetVisitThreshold,
            &state_and_word(state, (visits - 1) as u32),
        )
    }

    /// Program the pulse-channel output of `state`.
    ///
    /// The channel outputs `volts_a` on entry and switches to `volts_b` half a
    /// tick (4 ns) later. Equal values give a plain level.
    pub fn set_pulse_voltage(
        &mut self,
        state: StateId,
        channel: PulseChannel,
        volts_a: f64,
        volts_b: f64,
    ) -> Result<(), LinkError> {
        let [a_hi, a_lo] = codec::encode_pulse_voltage(volts_a)?.to_be_bytes();
        let [b_hi, b_lo] = codec::encode_pulse_voltage(volts_b)?.to_be_bytes();
        self.send(
            Opcode::SetPulseVoltage,
            &[state.as_u8(), channel.wire(), a_hi, a_lo, b_hi, b_lo],
        )
    }

    /// Drive the pins in `mask` high when `state` is entered.
    pub fn set_bits(&mut self, state: StateId, mask: u32) -> Result<(), LinkError> {
        self.send(Opcode::SetBits, &state_and_word(state, mask))
    }

    /// Drive the pins in `mask` low when `state` is entered.
    pub fn clear_bits(&mut self, state: StateId, mask: u32) -> Result<(), LinkError> {
        self.send(Opcode::ClearBits, &state_and_word(state, mask))
    }

    /// Turn the pins in `mask` into inputs when `state` is entered.
    pub fn set_inputs(&mut self, state: StateId, mask: u32) -> Result<(), LinkError> {
        self.send(Opcode::SetInputs, &state_and_word(state, mask))
    }

    pub fn current_state(&mut self) -> Result<StateId, LinkError> {
        let response = self.query(Opcode::GetCurrentState, &[], 1)?;
        Ok(StateId::new(response[0]))
    }

    pub fn is_state_occupied(&mut self, state: StateId) -> Result<bool, LinkError> {
        let response = self.query(Opcode::IsStateOccupied, &[state.as_u8()], 1)?;
        match response[0] {
            0x00 => Ok(false),
            0x01 => Ok(true),
            other => Err(LinkError::Malformed {
                opcode: Opcode::IsStateOccupied,
                reason: format!("occupancy flag {other:#04X} is neither 0 nor 1"),
            }),
        }
    }

    /// Reset `state` and return it to the device pool.
    pub fn free_state(&mut self, state: StateId) -> Result<(), LinkError> {
        self.send(Opcode::FreeState, &[state.as_u8()])
    }

    /// Mark `state` free without resetting its configuration.
    pub fn free_state_soft(&mut self, state: StateId) -> Result<(), LinkError> {
        self.send(Opcode::FreeStateSoft, &[state.as_u8()])
    }

    /// Check the link is in step with the device.
    pub fn sync(&mut self) -> Result<(), LinkError> {
        let response = self.query(Opcode::Sync, &[], 1)?;
        if response[0] == frame::SYNC_ECHO {
            Ok(())
        } else {
            Err(LinkError::SyncMismatch { got: response[0] })
        }
    }

    pub fn firmware_version(&mut self) -> Result<FirmwareVersion, LinkError> {
        let response = self.query(Opcode::FirmwareVersion, &[], 2)?;
        Ok(FirmwareVersion::new(response[0], response[1]))
    }

    /// 64-bit unique device serial number.
    pub fn serial_number(&mut self) -> Result<u64, LinkError> {
        let response = self.query(Opcode::SerialNumber, &[], 8)?;
        Ok(BigEndian::read_u64(&response))
    }

    pub fn build_id(&mut self) -> Result<u64, LinkError> {
        let response = self.query(Opcode::BuildId, &[], 8)?;
        Ok(BigEndian::read_u64(&response))
    }

    /// Firmware build timestamp as reported by the device.
    pub fn build_time(&mut self) -> Result<u32, LinkError> {
        let response = self.query(Opcode::BuildTime, &[], 4)?;
        Ok(BigEndian::read_u32(&response))
    }

    /// Sample all 32 pins.
    pub fn pin_values(&mut self) -> Result<u32, LinkError> {
        let response = self.query(Opcode::GetPinValues, &[], 4)?;
        Ok(BigEndian::read_u32(&response))
    }

    pub fn visit_counter(&mut self, state: StateId) -> Result<u32, LinkError> {
        let response = self.query(Opcode::GetVisitCounter, &[state.as_u8()], 4)?;
        Ok(BigEndian::read_u32(&response))
    }

    pub fn reset_visit_counters(&mut self) -> Result<(), LinkError> {
        self.send(Opcode::ResetVisitCounters, &[])
    }

    /// Load the byte pattern used by pattern-match conditions.
    pub fn set_data_pattern(&mut self, pattern: &[u8]) -> Result<(), LinkError> {
        if pattern.len() > MAX_DATA_PATTERN_LEN {
            return Err(ParameterError::PatternTooLong {
                len: pattern.len(),
                max: MAX_DATA_PATTERN_LEN,
            }
            .into());
        }
        let mut operands = vec![0u8; 4];
        BigEndian::write_u32(&mut operands, pattern.len() as u32);
        operands.extend_from_slice(pattern);
        self.send(Opcode::SetDataPattern, &operands)
    }

    /// Stage a slow analog output voltage. Takes effect on [`Self::commit_slow_voltage`].
    pub fn set_slow_voltage(&mut self, output: u8, volts: f64) -> Result<(), LinkError> {
        if output > MAX_SLOW_OUTPUT {
            return Err(ParameterError::SlowOutputOutOfRange {
                output,
                max: MAX_SLOW_OUTPUT,
            }
            .into());
        }
        let [hi, lo] = codec::encode_slow_voltage(volts)?.to_be_bytes();
        self.send(Opcode::SetSlowVoltage, &[output, hi, lo])
    }

    pub fn commit_slow_voltage(&mut self) -> Result<(), LinkError> {
        self.send(Opcode::CommitSlowVoltage, &[])
    }

    /// Set the I/O bank logic level.
    pub fn set_logic_level(&mut self, volts: f64) -> Result<(), LinkError> {
        let [hi, lo] = codec::encode_logic_level(volts)?.to_be_bytes();
        self.send(Opcode::SetLogicLevel, &[hi, lo])
    }

    /// Poll until the FSM reports `target` or `timeout` elapses.
    ///
    /// Returns `true` if the target was reached.
    pub fn wait_until_state(&mut self, target: StateId, timeout: Duration) -> Result<bool, LinkError> {
        let begin = Instant::now();
        loop {
            if self.current_state()? == target {
                return Ok(true);
            }
            if begin.elapsed() > timeout {
                return Ok(false);
            }
        }
    }
}

impl<T: Transport> fmt::Debug for DeviceLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLink")
            .field("core", &self.core)
            .field("firmware", &self.firmware)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::sim::SimulatedDevice;

    fn open(device: SimulatedDevice) -> DeviceLink<SimulatedDevice> {
        DeviceLink::open(device, &LinkConfig::default()).unwrap()
    }

    #[test]
    fn open_selects_core_then_reads_firmware() {
        let link = open(SimulatedDevice::new());
        let frames = link.transport().frames();
        assert_eq!(frames[0], vec![0x00, 0x0B, 0x00]);
        assert_eq!(frames[1], vec![0xFF, 0x06]);
        assert_eq!(link.firmware(), FirmwareVersion::new(1, 4));
    }

    #[test]
    fn old_firmware_is_rejected() {
        let device = SimulatedDevice::new().with_firmware(FirmwareVersion::new(1, 3));
        let err = DeviceLink::open(device, &LinkConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LinkError::IncompatibleFirmware { found, .. } if found == FirmwareVersion::new(1, 3)
        ));
    }

    #[test]
    fn newer_major_with_lower_minor_is_accepted() {
        let device = SimulatedDevice::new().with_firmware(FirmwareVersion::new(2, 0));
        assert!(DeviceLink::open(device, &LinkConfig::default()).is_ok());
    }

    #[test]
    fn core_scoped_commands_select_core_first() {
        let config = LinkConfig::default().with_core(Core::Two);
        let mut link = DeviceLink::open(SimulatedDevice::new(), &config).unwrap();
        link.transport_mut().clear_frames();

        link.force_state(StateId::new(9)).unwrap();

        let frames = link.transport().frames();
        assert_eq!(frames, &[vec![0x00, 0x0B, 0x01], vec![0x00, 0x03, 0x09]]);
    }

    #[test]
    fn global_commands_skip_core_selection() {
        let mut link = open(SimulatedDevice::new());
        link.transport_mut().clear_frames();

        link.set_slow_voltage(2, 5.0).unwrap();
        link.commit_slow_voltage().unwrap();

        let frames = link.transport().frames();
        assert_eq!(frames, &[vec![0x01, 0x00, 0x02, 0x0F, 0xFF], vec![0x01, 0x01]]);
    }

    #[test]
    fn thresholds_are_big_endian_minus_one() {
        let mut link = open(SimulatedDevice::new());
        link.transport_mut().clear_frames();

        link.set_timer_threshold(StateId::new(4), Ticks::new(0x0102_0304).unwrap())
            .unwrap();
        link.set_visit_threshold(StateId::new(4), 2).unwrap();

        let frames = link.transport().frames();
        assert_eq!(frames[1], vec![0x00, 0x09, 0x04, 0x01, 0x02, 0x03, 0x03]);
        assert_eq!(frames[3], vec![0x00, 0x19, 0x04, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn pulse_voltage_pair_is_encoded_signed() {
        let mut link = open(SimulatedDevice::new());
        link.transport_mut().clear_frames();

        link.set_pulse_voltage(StateId::new(1), PulseChannel::Ch2, 4.0, -4.0)
            .unwrap();

        let frames = link.transport().frames();
        assert_eq!(
            frames[1],
            vec![0x00, 0x1E, 0x01, 0x01, 0x7F, 0xFF, 0x80, 0x00]
        );
    }

    #[test]
    fn invalid_voltage_sends_nothing() {
        let mut link = open(SimulatedDevice::new());
        link.transport_mut().clear_frames();

        let err = link
            .set_pulse_voltage(StateId::new(1), PulseChannel::Ch1, 0.0, 9.0)
            .unwrap_err();

        assert!(matches!(err, LinkError::Parameter(_)));
        assert!(link.transport().frames().is_empty());
    }

    #[test]
    fn sync_checks_echo_byte() {
        let mut link = open(SimulatedDevice::new());
        assert!(link.sync().is_ok());

        link.transport_mut().corrupt_sync(0x00);
        assert!(matches!(link.sync(), Err(LinkError::SyncMismatch { got: 0x00 })));
    }

    #[test]
    fn missing_response_is_timeout() {
        let mut link = open(SimulatedDevice::new());
        link.transport_mut().go_silent();
        assert!(matches!(
            link.current_state(),
            Err(LinkError::Timeout {
                opcode: Opcode::GetCurrentState
            })
        ));
    }

    #[test]
    fn serial_number_is_read_big_endian() {
        let device = SimulatedDevice::new().with_serial_number(0x0011_2233_4455_6677);
        let mut link = open(device);
        assert_eq!(link.serial_number().unwrap(), 0x0011_2233_4455_6677);
    }

    #[test]
    fn pin_mask_rejects_out_of_range_pins() {
        assert_eq!(pin_mask(&[0, 8, 31]).unwrap(), 0x8000_0101);
        assert!(matches!(
            pin_mask(&[32]),
            Err(ParameterError::PinOutOfRange { pin: 32, .. })
        ));
    }

    #[test]
    fn data_pattern_length_prefix() {
        let mut link = open(SimulatedDevice::new());
        link.transport_mut().clear_frames();

        link.set_data_pattern(&[0xAA, 0x55]).unwrap();
        assert_eq!(
            link.transport().frames()[0],
            vec![0x00, 0x21, 0, 0, 0, 2, 0xAA, 0x55]
        );
        assert!(link.set_data_pattern(&[0u8; 257]).is_err());
    }

    #[test]
    fn soft_free_and_input_mask_frames() {
        let mut link = open(SimulatedDevice::new());
        link.set_inputs(StateId::new(7), 0x0000_0100).unwrap();
        assert!(link.is_state_occupied(StateId::new(7)).unwrap());
        link.transport_mut().clear_frames();

        link.free_state_soft(StateId::new(7)).unwrap();

        assert_eq!(link.transport().frames()[1], vec![0x00, 0x39, 0x07]);
        assert!(!link.is_state_occupied(StateId::new(7)).unwrap());
    }

    #[test]
    fn firmware_version_parses_from_str() {
        assert_eq!("1.4".parse::<FirmwareVersion>(), Ok(FirmwareVersion::new(1, 4)));
        assert!("14".parse::<FirmwareVersion>().is_err());
    }
}
