//! Glitch Campaign
//!
//! This example sweeps pulse delay and width against the simulated device.
//!
//! Key concepts:
//! - Link and controller settings come from `CHRONO_*` environment variables
//! - One trial per parameter set: forget, rebuild, start, wait
//! - Trials that never finish are recorded as timeouts, not errors
//! - The history serializes to JSON for later analysis
//!
//! Run with: cargo run --example glitch_campaign

use chronoglitch::chronology::Chronology;
use chronoglitch::config::{ControllerConfig, LinkConfig};
use chronoglitch::controller::{GlitchParams, PulseShape, TrialRunner};
use chronoglitch::core::{Edge, PulseChannel};
use chronoglitch::link::sim::{SimulatedDevice, TriggerMode};
use chronoglitch::link::DeviceLink;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Glitch Campaign Example ===\n");

    let link_config = LinkConfig::from_env()?;
    let controller_config = ControllerConfig::from_env()?;

    let device = SimulatedDevice::new().with_serial_number(0x5EED_0000_0000_0001);
    let mut link = DeviceLink::open(device, &link_config)?;
    println!(
        "Device {:016X}, firmware {}, {}",
        link.serial_number()?,
        link.firmware(),
        link.core()
    );

    let mut chronology = Chronology::new(link)?;
    chronology.set_pulse_voltage_now(PulseChannel::Ch1, 3.3)?;
    chronology.set_power_now(0, 50)?;

    let trigger_pin = controller_config.trigger_pin;
    let mut runner = TrialRunner::new(chronology, controller_config);

    // Sweep: delay in 4 ns steps, width in 8 ns steps.
    println!("\nSweep");
    for delay_ns in (2_996..=3_008).step_by(4) {
        for width_ns in [24, 32, 40] {
            let shape = PulseShape::new(0.8, delay_ns as f64 * 1e-9, width_ns as f64 * 1e-9);
            let record = runner.run_glitch(&GlitchParams::new(shape))?;
            println!(
                "  delay {delay_ns:>5} ns, width {width_ns:>2} ns: {} states, {}",
                record.states,
                if record.timed_out { "timed out" } else { "finished" }
            );
        }
    }

    // A target that never raises its trigger.
    println!("\nSilent target");
    runner
        .chronology_mut()
        .link_mut()
        .transport_mut()
        .set_triggers(TriggerMode::External);
    let record = runner.run_trial(|c| {
        c.wait_trigger(trigger_pin, Edge::Rising, 1)?;
        c.pulse(PulseChannel::Ch1, 0.8, 3e-6, 40e-9)
    })?;
    println!(
        "  timed out: {}, parked in {}",
        record.timed_out, record.final_state
    );

    println!("\nLast program");
    print!("{}", runner.chronology().listing());

    let history = runner.history();
    println!(
        "\n{} trials, {} timeouts, {:?} total",
        history.len(),
        history.timeouts(),
        history.duration()
    );
    println!("{}", serde_json::to_string_pretty(history.last().ok_or("no trials")?)?);

    let link = runner.into_chronology().release()?;
    println!("\nReleased {}", link.core());
    Ok(())
}
