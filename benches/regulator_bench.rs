//! Criterion benchmarks for the regulation hot path.
//!
//! With regulation enabled, every published capture costs one windowed average
//! plus a forward FFT and two band-energy scans. These paths set the ceiling on
//! how fast the acquisition loop can poll.
//!
//! Run with: cargo bench --bench regulator_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scope_daq::regulator::{AmplitudeRegulator, RegulatorConfig, Spectrum};

const DRIVE_FREQUENCY: f64 = 1.0e5;
const SAMPLE_RATE: f64 = 2.5e6;

fn sine_frame(n: usize, subharmonic_level: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            let omega = 2.0 * std::f64::consts::PI * DRIVE_FREQUENCY;
            (omega * t).sin() + subharmonic_level * (1.5 * omega * t).sin()
        })
        .collect()
}

/// Forward FFT and one-sided magnitude normalization across record lengths.
fn spectrum_from_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectrum");

    for n in [256usize, 1000, 4096, 16384] {
        let frame = sine_frame(n, 0.8);
        group.bench_with_input(BenchmarkId::new("from_samples", n), &n, |b, _| {
            b.iter(|| {
                let spectrum = Spectrum::from_samples(black_box(&frame), SAMPLE_RATE);
                black_box(spectrum);
            });
        });
    }

    group.finish();
}

/// Detection over a full five-capture window, the per-update worst case.
fn detection_over_full_window(c: &mut Criterion) {
    let mut regulator = AmplitudeRegulator::new(RegulatorConfig::default());
    for _ in 0..5 {
        regulator.register_frame(&sine_frame(1000, 0.8)).unwrap();
    }

    c.bench_function("subharmonic_present", |b| {
        b.iter(|| {
            black_box(regulator.subharmonic_present(DRIVE_FREQUENCY, SAMPLE_RATE));
        });
    });
}

/// One full regulation cycle as the acquisition loop runs it per capture.
fn amplitude_update_cycle(c: &mut Criterion) {
    let frame = sine_frame(1000, 0.8);

    c.bench_function("register_and_update", |b| {
        let mut regulator = AmplitudeRegulator::new(RegulatorConfig::default());
        b.iter(|| {
            regulator.register_frame(black_box(&frame)).unwrap();
            black_box(regulator.update_amplitude(1.0, DRIVE_FREQUENCY, SAMPLE_RATE));
        });
    });
}

criterion_group!(
    benches,
    spectrum_from_samples,
    detection_over_full_window,
    amplitude_update_cycle
);
criterion_main!(benches);
