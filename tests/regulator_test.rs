//! Multi-update regulation journeys against synthesized scope captures.
//!
//! Frames are sampled so the drive tone and the 1.5x subharmonic land on exact
//! FFT bins and leak nowhere else. That keeps every detection decision, and
//! therefore every voltage step, deterministic.

use scope_daq::regulator::{AmplitudeRegulator, RegulatorConfig};

const DRIVE_FREQUENCY: f64 = 1.0e5;
const SAMPLE_RATE: f64 = 2.5e6;
const RECORD_LENGTH: usize = 1000;

fn sine_frame(subharmonic_level: f64) -> Vec<f64> {
    (0..RECORD_LENGTH)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            let omega = 2.0 * std::f64::consts::PI * DRIVE_FREQUENCY;
            (omega * t).sin() + subharmonic_level * (1.5 * omega * t).sin()
        })
        .collect()
}

/// Registers one capture and runs one update, returning the commanded voltage.
fn step(regulator: &mut AmplitudeRegulator, frame: &[f64], voltage: f64) -> f64 {
    regulator.register_frame(frame).unwrap();
    regulator.update_amplitude(voltage, DRIVE_FREQUENCY, SAMPLE_RATE)
}

#[test]
fn test_clean_drive_climbs_one_step_per_update() {
    let mut regulator = AmplitudeRegulator::new(RegulatorConfig::default());
    let frame = sine_frame(0.0);

    // One seed capture so every later update has a full pair to average.
    regulator.register_frame(&frame).unwrap();

    let mut voltage = 1.0;
    for update in 1..=10 {
        voltage = step(&mut regulator, &frame, voltage);
        let expected = 1.0 + 0.02 * update as f64;
        assert!(
            (voltage - expected).abs() < 1e-9,
            "update {}: expected {} got {}",
            update,
            expected,
            voltage
        );
    }
    assert!((voltage - 1.2).abs() < 1e-9);
}

#[test]
fn test_subharmonic_drive_backs_off_one_step_per_update() {
    let mut regulator = AmplitudeRegulator::new(RegulatorConfig::default());
    let frame = sine_frame(0.8);

    regulator.register_frame(&frame).unwrap();

    let mut voltage = 1.0;
    for update in 1..=10 {
        voltage = step(&mut regulator, &frame, voltage);
        let expected = 1.0 - 0.02 * update as f64;
        assert!(
            (voltage - expected).abs() < 1e-9,
            "update {}: expected {} got {}",
            update,
            expected,
            voltage
        );
    }
    assert!((voltage - 0.8).abs() < 1e-9);
    assert_eq!(regulator.last_safe_voltage(), Some(voltage));
}

#[test]
fn test_recovery_waits_for_the_window_to_flush() {
    let mut regulator = AmplitudeRegulator::new(RegulatorConfig::default());
    let dirty = sine_frame(0.8);
    let clean = sine_frame(0.0);

    regulator.register_frame(&dirty).unwrap();
    let mut voltage = 1.0;
    for _ in 0..3 {
        voltage = step(&mut regulator, &dirty, voltage);
    }
    assert!((voltage - 0.94).abs() < 1e-9);

    // The subharmonic clears, but four dirty captures still sit in the
    // five-deep window. Averaging keeps the detector tripped until the last
    // one is evicted, so the voltage only turns around on the fifth update.
    let mut trace = Vec::new();
    for _ in 0..7 {
        voltage = step(&mut regulator, &clean, voltage);
        trace.push(voltage);
    }
    let expected = [0.92, 0.90, 0.88, 0.86, 0.88, 0.90, 0.92];
    for (update, (got, want)) in trace.iter().zip(expected.iter()).enumerate() {
        assert!(
            (got - want).abs() < 1e-9,
            "update {}: expected {} got {}",
            update,
            want,
            got
        );
    }
}
