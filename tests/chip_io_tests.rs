//! The numeric register/IO surface, driven the way an external caller would.

mod helpers;

use helpers::*;
use sidney::core::registers::{
    MODE_VOLUME, OSC3, V1_ATTACK_DECAY, V1_CONTROL, V1_SUSTAIN_RELEASE,
};
use sidney::core::{ChipHost, IoCommand, VoiceControl, IO_FAILURE, POOL_CAPACITY, REGISTER_FAILURE};

fn io(host: &mut ChipHost, handle: i32, command: IoCommand, param: f32) -> f32 {
    host.io_raw(handle, command.id(), param)
}

fn init(host: &mut ChipHost) -> i32 {
    let handle = io(host, -1, IoCommand::Init, 44_100.0);
    assert!(handle >= 0.0, "init failed");
    handle as i32
}

#[test]
fn test_a440_block_end_to_end() {
    let mut host = ChipHost::new();
    let chip = init(&mut host);

    assert_eq!(host.register_raw(chip, V1_ATTACK_DECAY as i32, 0x00), 0);
    host.register_raw(chip, V1_SUSTAIN_RELEASE as i32, 0xF0);
    host.register_raw(chip, MODE_VOLUME as i32, 0x0F);
    let gate_ramp = (VoiceControl::RAMP | VoiceControl::GATE).bits() as i32;
    host.register_raw(chip, V1_CONTROL as i32, gate_ramp);

    let block: Vec<f32> = (0..256)
        .map(|_| io(&mut host, chip, IoCommand::Clock, 0.0))
        .collect();

    let expected = 2.0 * 440.0 * 256.0 / TEST_SAMPLE_RATE;
    let crossings = zero_crossings(&block) as f64;
    assert!(
        (crossings - expected).abs() <= 1.0,
        "crossings {crossings} expected {expected}"
    );
}

#[test]
fn test_sentinels_for_bad_input() {
    let mut host = ChipHost::new();
    let chip = init(&mut host);

    assert_eq!(host.register_raw(chip, 0x1E, 0), REGISTER_FAILURE);
    assert_eq!(host.register_raw(chip, -3, 0), REGISTER_FAILURE);
    assert_eq!(host.register_raw(chip + 1, 0x00, 0), REGISTER_FAILURE);
    assert_eq!(io(&mut host, chip, IoCommand::Gain, 0.5), 0.5);
    assert_eq!(host.io_raw(chip, 42, 0.0), IO_FAILURE);

    // Writing a read-only tap returns its value and stores nothing
    let tap = host.register_raw(chip, OSC3 as i32, 0xAB);
    assert_ne!(tap, REGISTER_FAILURE);
}

#[test]
fn test_destroyed_handle_is_stale() {
    let mut host = ChipHost::new();
    let first = init(&mut host);
    assert_eq!(io(&mut host, first, IoCommand::Destroy, 0.0), 0.0);
    assert_eq!(io(&mut host, first, IoCommand::Clock, 0.0), IO_FAILURE);

    // The slot is reused under a new generation
    let second = init(&mut host);
    assert_ne!(first, second);
    assert_eq!(first & 0xFF, second & 0xFF);
    assert_eq!(host.register_raw(first, 0x00, 0), REGISTER_FAILURE);
    assert_ne!(host.register_raw(second, 0x00, 0), REGISTER_FAILURE);
}

#[test]
fn test_pool_exhaustion_returns_negative_handle() {
    let mut host = ChipHost::new();
    for _ in 0..POOL_CAPACITY {
        init(&mut host);
    }
    assert_eq!(io(&mut host, -1, IoCommand::Init, 44_100.0), IO_FAILURE);
}

#[test]
fn test_analog_commands_clamp() {
    let mut host = ChipHost::new();
    let chip = init(&mut host);
    assert_eq!(io(&mut host, chip, IoCommand::Gain, 100.0), 8.0);
    assert_eq!(io(&mut host, chip, IoCommand::Detune, 1.0), 0.1);
    assert_eq!(io(&mut host, chip, IoCommand::Leakage, -1.0), 0.0);
    assert_eq!(io(&mut host, chip, IoCommand::SnRatio, 2.0), 1.0);
    assert_eq!(io(&mut host, chip, IoCommand::DcBias, -3.0), -1.0);
    assert_eq!(io(&mut host, chip, IoCommand::PoleMix, 0.5), 0.5);
    assert_eq!(io(&mut host, chip, IoCommand::ClockRate, 10.0), 100_000.0);
}
