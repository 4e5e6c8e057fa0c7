//! In-memory model of the glitch FSM device.
//!
//! `SimulatedDevice` implements [`Transport`] by decoding every frame the
//! link writes and answering queries the way the firmware does. It keeps a
//! log of raw frames so tests can assert exact wire traffic, and it executes
//! the programmed FSM so tests can observe a chronology running.
//!
//! Time and trigger inputs are controlled by the test:
//! - [`TimerMode::Instant`] lets timer conditions fire as soon as a state is
//!   entered; [`TimerMode::Frozen`] holds them until [`SimulatedDevice::expire_timer`].
//! - [`TriggerMode::Immediate`] treats edge, level and pattern conditions as
//!   already satisfied; [`TriggerMode::External`] waits for
//!   [`SimulatedDevice::inject_edge`] or pin levels set with
//!   [`SimulatedDevice::set_input_level`].

use crate::core::{Core, Edge, Level, Priority, PulseChannel, StateId, STATES_PER_CORE};
use crate::link::frame::{Command, Opcode, SYNC_ECHO};
use crate::link::transport::Transport;
use crate::link::FirmwareVersion;
use byteorder::{BigEndian, ByteOrder};
use std::collections::VecDeque;
use std::io;

const MODE_DISABLED: u16 = 0x0000;
const MODE_TIMER: u16 = 0x0001;
const MODE_VISITS: u16 = 0x0003;
const MODE_PIN: u16 = 0x0002;
const PATTERN_PIN: u8 = 32;

// Upper bound on transitions taken per settle, so self-loops cannot hang a test.
const MAX_SETTLE_STEPS: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerMode {
    Instant,
    Frozen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    Immediate,
    External,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    occupied: bool,
    next: [u8; 2],
    mode: [u16; 2],
    timer: u32,
    visit_threshold: u32,
    visits: u32,
    set_mask: u32,
    clear_mask: u32,
    input_mask: u32,
    pulse: [Option<(i16, i16)>; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PinCondition {
    Edge(u8, Edge),
    Level(u8, Level),
    Pattern,
}

fn decode_pin_condition(mode: u16) -> Option<PinCondition> {
    if mode & 0x03 != MODE_PIN {
        return None;
    }
    let pin = (mode >> 4) as u8;
    if pin == PATTERN_PIN {
        return Some(PinCondition::Pattern);
    }
    Some(match mode & 0x0C {
        0x00 => PinCondition::Edge(pin, Edge::Rising),
        0x04 => PinCondition::Edge(pin, Edge::Falling),
        0x0C => PinCondition::Level(pin, Level::High),
        _ => PinCondition::Level(pin, Level::Low),
    })
}

#[derive(Clone, Debug)]
struct CoreModel {
    slots: Vec<Slot>,
    current: u8,
    running: bool,
    pin_outputs: u32,
    pulse_level: [i16; 2],
}

impl CoreModel {
    fn new() -> Self {
        Self {
            slots: vec![Slot::default(); STATES_PER_CORE],
            current: 0,
            running: false,
            pin_outputs: 0,
            pulse_level: [0; 2],
        }
    }

    fn slot_mut(&mut self, state: u8) -> &mut Slot {
        let slot = &mut self.slots[state as usize];
        slot.occupied = true;
        slot
    }

    fn enter(&mut self, state: u8) {
        self.current = state;
        let slot = &mut self.slots[state as usize];
        slot.visits = slot.visits.saturating_add(1);
        self.pin_outputs = (self.pin_outputs | slot.set_mask) & !slot.clear_mask;
        for (level, pulse) in self.pulse_level.iter_mut().zip(slot.pulse.iter()) {
            if let Some((_, settled)) = pulse {
                *level = *settled;
            }
        }
    }

    fn pending(&self, timers: TimerMode, triggers: TriggerMode, inputs: u32) -> Option<u8> {
        let slot = &self.slots[self.current as usize];
        for p in 0..2 {
            let fires = match slot.mode[p] {
                MODE_DISABLED => false,
                MODE_TIMER => timers == TimerMode::Instant,
                MODE_VISITS => slot.visits > slot.visit_threshold,
                mode => match decode_pin_condition(mode) {
                    Some(_) if triggers == TriggerMode::Immediate => true,
                    Some(PinCondition::Level(pin, level)) => {
                        let high = inputs & (1 << pin) != 0;
                        high == (level == Level::High)
                    }
                    _ => false,
                },
            };
            if fires {
                return Some(slot.next[p]);
            }
        }
        None
    }

    fn settle(&mut self, timers: TimerMode, triggers: TriggerMode, inputs: u32) {
        if !self.running {
            return;
        }
        for _ in 0..MAX_SETTLE_STEPS {
            match self.pending(timers, triggers, inputs) {
                Some(next) => self.enter(next),
                None => return,
            }
        }
    }
}

/// Simulated two-core glitch FSM device.
#[derive(Clone, Debug)]
pub struct SimulatedDevice {
    cores: [CoreModel; 2],
    selected: usize,
    firmware: FirmwareVersion,
    serial_number: u64,
    build_id: u64,
    build_time: u32,
    frames: Vec<Vec<u8>>,
    responses: VecDeque<u8>,
    timers: TimerMode,
    triggers: TriggerMode,
    inputs: u32,
    sync_echo: u8,
    silent: bool,
    write_budget: Option<usize>,
    staged_slow: [u16; 6],
    slow_outputs: [u16; 6],
    logic_level: u16,
    data_pattern: Vec<u8>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// A device at firmware 1.4 with instant timers and immediate triggers.
    pub fn new() -> Self {
        Self {
            cores: [CoreModel::new(), CoreModel::new()],
            selected: 0,
            firmware: FirmwareVersion::MIN_COMPATIBLE,
            serial_number: 0,
            build_id: 0,
            build_time: 0,
            frames: Vec::new(),
            responses: VecDeque::new(),
            timers: TimerMode::Instant,
            triggers: TriggerMode::Immediate,
            inputs: 0,
            sync_echo: SYNC_ECHO,
            silent: false,
            write_budget: None,
            staged_slow: [0; 6],
            slow_outputs: [0; 6],
            logic_level: 0,
            data_pattern: Vec::new(),
        }
    }

    pub fn with_firmware(mut self, firmware: FirmwareVersion) -> Self {
        self.firmware = firmware;
        self
    }

    pub fn with_serial_number(mut self, serial_number: u64) -> Self {
        self.serial_number = serial_number;
        self
    }

    pub fn with_timers(mut self, timers: TimerMode) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerMode) -> Self {
        self.triggers = triggers;
        self
    }

    /// A device that never advances on its own.
    pub fn stalled() -> Self {
        Self::new()
            .with_timers(TimerMode::Frozen)
            .with_triggers(TriggerMode::External)
    }

    pub fn set_timers(&mut self, timers: TimerMode) {
        self.timers = timers;
    }

    pub fn set_triggers(&mut self, triggers: TriggerMode) {
        self.triggers = triggers;
    }

    /// Mark `state` as used by someone else.
    pub fn occupy(&mut self, core: Core, state: StateId) {
        self.core_mut(core).slot_mut(state.as_u8());
    }

    /// Every raw frame written so far, in order.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Frames with select-core frames filtered out, decoded to commands.
    pub fn commands(&self) -> Vec<Command> {
        self.frames
            .iter()
            .filter_map(|frame| {
                let opcode = Opcode::from_header(frame[0], frame[1])?;
                (opcode != Opcode::SelectCore).then(|| Command::new(opcode, &frame[2..]))
            })
            .collect()
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    /// Answer the next sync request with `echo` instead of 0xD0.
    pub fn corrupt_sync(&mut self, echo: u8) {
        self.sync_echo = echo;
    }

    /// Stop answering queries, as a disconnected device would.
    pub fn go_silent(&mut self) {
        self.silent = true;
    }

    /// Accept `frames` more frames, then fail every write as a broken pipe.
    pub fn disconnect_after(&mut self, frames: usize) {
        self.write_budget = Some(frames);
    }

    /// Accept writes again after [`SimulatedDevice::disconnect_after`].
    pub fn reconnect(&mut self) {
        self.write_budget = None;
    }

    fn core(&self, core: Core) -> &CoreModel {
        &self.cores[core.id() as usize]
    }

    fn core_mut(&mut self, core: Core) -> &mut CoreModel {
        &mut self.cores[core.id() as usize]
    }

    fn slot(&self, core: Core, state: StateId) -> &Slot {
        &self.core(core).slots[state.index()]
    }

    pub fn current_state(&self, core: Core) -> StateId {
        StateId::new(self.core(core).current)
    }

    pub fn is_running(&self, core: Core) -> bool {
        self.core(core).running
    }

    pub fn is_occupied(&self, core: Core, state: StateId) -> bool {
        self.slot(core, state).occupied
    }

    pub fn occupied_states(&self, core: Core) -> Vec<StateId> {
        StateId::all()
            .filter(|&s| self.is_occupied(core, s))
            .collect()
    }

    pub fn next_state(&self, core: Core, state: StateId, priority: Priority) -> StateId {
        StateId::new(self.slot(core, state).next[priority.wire() as usize])
    }

    pub fn condition_mode(&self, core: Core, state: StateId, priority: Priority) -> u16 {
        self.slot(core, state).mode[priority.wire() as usize]
    }

    /// Raw timer-overflow register.
    pub fn timer_register(&self, core: Core, state: StateId) -> u32 {
        self.slot(core, state).timer
    }

    /// Raw visit-threshold register.
    pub fn visit_register(&self, core: Core, state: StateId) -> u32 {
        self.slot(core, state).visit_threshold
    }

    pub fn visits(&self, core: Core, state: StateId) -> u32 {
        self.slot(core, state).visits
    }

    /// Pulse-channel code pair programmed on `state`.
    pub fn pulse_codes(&self, core: Core, state: StateId, channel: PulseChannel) -> Option<(i16, i16)> {
        self.slot(core, state).pulse[channel.index()]
    }

    /// Pulse-channel code currently output.
    pub fn pulse_level(&self, core: Core, channel: PulseChannel) -> i16 {
        self.core(core).pulse_level[channel.index()]
    }

    pub fn set_mask(&self, core: Core, state: StateId) -> u32 {
        self.slot(core, state).set_mask
    }

    pub fn clear_mask(&self, core: Core, state: StateId) -> u32 {
        self.slot(core, state).clear_mask
    }

    pub fn pin_outputs(&self, core: Core) -> u32 {
        self.core(core).pin_outputs
    }

    /// Committed 12-bit code of a slow analog output.
    pub fn slow_output(&self, output: u8) -> u16 {
        self.slow_outputs[output as usize]
    }

    pub fn logic_level(&self) -> u16 {
        self.logic_level
    }

    pub fn data_pattern(&self) -> &[u8] {
        &self.data_pattern
    }

    /// Let the pending timer condition of `core` expire once.
    pub fn expire_timer(&mut self, core: Core) {
        let (timers, triggers, inputs) = (self.timers, self.triggers, self.inputs);
        let model = self.core_mut(core);
        if !model.running {
            return;
        }
        let slot = &model.slots[model.current as usize];
        let next = (0..2)
            .find(|&p| slot.mode[p] == MODE_TIMER)
            .map(|p| slot.next[p]);
        if let Some(next) = next {
            model.enter(next);
            model.settle(timers, triggers, inputs);
        }
    }

    /// Apply an edge on an input pin to every running core.
    pub fn inject_edge(&mut self, pin: u8, edge: Edge) {
        match edge {
            Edge::Rising => self.inputs |= 1 << pin,
            Edge::Falling => self.inputs &= !(1 << pin),
        }
        let (timers, triggers, inputs) = (self.timers, self.triggers, self.inputs);
        for model in self.cores.iter_mut().filter(|m| m.running) {
            let slot = &model.slots[model.current as usize];
            let next = (0..2)
                .find(|&p| decode_pin_condition(slot.mode[p]) == Some(PinCondition::Edge(pin, edge)))
                .map(|p| slot.next[p]);
            if let Some(next) = next {
                model.enter(next);
                model.settle(timers, triggers, inputs);
            }
        }
    }

    /// Set an input pin level without generating an edge.
    pub fn set_input_level(&mut self, pin: u8, level: Level) {
        match level {
            Level::High => self.inputs |= 1 << pin,
            Level::Low => self.inputs &= !(1 << pin),
        }
        let (timers, triggers, inputs) = (self.timers, self.triggers, self.inputs);
        for model in self.cores.iter_mut() {
            model.settle(timers, triggers, inputs);
        }
    }

    fn respond(&mut self, bytes: &[u8]) {
        self.responses.extend(bytes.iter().copied());
    }

    fn handle(&mut self, opcode: Opcode, op: &[u8]) -> io::Result<()> {
        let (timers, triggers, inputs) = (self.timers, self.triggers, self.inputs);
        let selected = self.selected;
        let model = &mut self.cores[selected];
        match opcode {
            Opcode::SelectCore => {
                self.selected = Core::from_id(op[0])
                    .ok_or_else(|| invalid(format!("no core {}", op[0])))?
                    .id() as usize;
            }
            Opcode::Run => {
                model.running = true;
                model.settle(timers, triggers, inputs);
            }
            Opcode::Hold => model.running = false,
            Opcode::ForceState => {
                model.enter(op[0]);
                model.settle(timers, triggers, inputs);
            }
            Opcode::SetNextState => {
                let p = priority_index(op[0])?;
                model.slot_mut(op[1]).next[p] = op[2];
            }
            Opcode::SetConditionMode => {
                let p = priority_index(op[0])?;
                model.slot_mut(op[1]).mode[p] = BigEndian::read_u16(&op[2..4]);
            }
            Opcode::SetTimerThreshold => {
                model.slot_mut(op[0]).timer = BigEndian::read_u32(&op[1..5]);
            }
            Opcode::SetVisitThreshold => {
                model.slot_mut(op[0]).visit_threshold = BigEndian::read_u32(&op[1..5]);
            }
            Opcode::SetPulseVoltage => {
                let channel = PulseChannel::from_wire(op[1])
                    .ok_or_else(|| invalid(format!("no pulse channel {}", op[1])))?;
                let a = BigEndian::read_i16(&op[2..4]);
                let b = BigEndian::read_i16(&op[4..6]);
                model.slot_mut(op[0]).pulse[channel.index()] = Some((a, b));
            }
            Opcode::SetBits => {
                let mask = BigEndian::read_u32(&op[1..5]);
                let slot = model.slot_mut(op[0]);
                slot.set_mask |= mask;
                slot.clear_mask &= !mask;
            }
            Opcode::ClearBits => {
                let mask = BigEndian::read_u32(&op[1..5]);
                let slot = model.slot_mut(op[0]);
                slot.clear_mask |= mask;
                slot.set_mask &= !mask;
            }
            Opcode::SetInputs => {
                model.slot_mut(op[0]).input_mask |= BigEndian::read_u32(&op[1..5]);
            }
            Opcode::GetPinValues => {
                let value = model.pin_outputs | inputs;
                self.respond(&value.to_be_bytes());
            }
            Opcode::GetCurrentState => {
                let current = model.current;
                self.respond(&[current]);
            }
            Opcode::GetVisitCounter => {
                let visits = model.slots[op[0] as usize].visits;
                self.respond(&visits.to_be_bytes());
            }
            Opcode::ResetVisitCounters => {
                model.slots.iter_mut().for_each(|s| s.visits = 0);
            }
            Opcode::IsStateOccupied => {
                let occupied = model.slots[op[0] as usize].occupied;
                self.respond(&[u8::from(occupied)]);
            }
            Opcode::FreeState => model.slots[op[0] as usize] = Slot::default(),
            Opcode::FreeStateSoft => model.slots[op[0] as usize].occupied = false,
            Opcode::Sync => {
                let echo = self.sync_echo;
                self.respond(&[echo]);
            }
            Opcode::SetDataPattern => self.data_pattern = op[4..].to_vec(),
            Opcode::SerialNumber => {
                let serial = self.serial_number;
                self.respond(&serial.to_be_bytes());
            }
            Opcode::SetSlowVoltage => {
                let output = op[0] as usize;
                if output >= self.staged_slow.len() {
                    return Err(invalid(format!("no slow output {output}")));
                }
                self.staged_slow[output] = BigEndian::read_u16(&op[1..3]);
            }
            Opcode::CommitSlowVoltage => self.slow_outputs = self.staged_slow,
            Opcode::SetLogicLevel => self.logic_level = BigEndian::read_u16(&op[0..2]),
            Opcode::FirmwareVersion => {
                let FirmwareVersion { major, minor } = self.firmware;
                self.respond(&[major, minor]);
            }
            Opcode::BuildId => {
                let id = self.build_id;
                self.respond(&id.to_be_bytes());
            }
            Opcode::BuildTime => {
                let time = self.build_time;
                self.respond(&time.to_be_bytes());
            }
        }
        Ok(())
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn priority_index(wire: u8) -> io::Result<usize> {
    Priority::from_wire(wire)
        .map(|p| p.wire() as usize)
        .ok_or_else(|| invalid(format!("no priority {wire}")))
}

impl Transport for SimulatedDevice {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self.write_budget.as_mut() {
            Some(0) => return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected")),
            Some(budget) => *budget -= 1,
            None => {}
        }
        if frame.len() < 2 {
            return Err(invalid(format!("frame too short: {frame:02X?}")));
        }
        self.frames.push(frame.to_vec());
        let opcode = Opcode::from_header(frame[0], frame[1])
            .ok_or_else(|| invalid(format!("unknown header {:02X} {:02X}", frame[0], frame[1])))?;
        let operands = &frame[2..];
        let expected = match opcode.operand_len() {
            Some(len) => len,
            None if operands.len() >= 4 => 4 + BigEndian::read_u32(&operands[..4]) as usize,
            None => 4,
        };
        if operands.len() != expected {
            return Err(invalid(format!(
                "{opcode} expects {expected} operand bytes, got {}",
                operands.len()
            )));
        }
        self.handle(opcode, operands)
    }

    fn read_response(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.silent {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "device is silent"));
        }
        if self.responses.len() < buf.len() {
            self.responses.clear();
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "response shorter than requested",
            ));
        }
        for byte in buf.iter_mut() {
            // Length checked above.
            *byte = self.responses.pop_front().unwrap_or_default();
        }
        Ok(())
    }
}
