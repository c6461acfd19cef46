//! Spectral safety regulator for the generator drive amplitude.
//!
//! The regulator watches recent scope captures for subharmonic content at 1.5x
//! and 2.5x the drive frequency. Each update averages the registered captures,
//! takes a one-sided magnitude spectrum, and compares the energy close to each
//! band center (within 5%) against the energy in the surrounding band (within
//! 10%, scaled by 2 to account for the width difference). A ratio above the
//! band's threshold reads as subharmonic activity.
//!
//! Updates are bang-bang: one fixed voltage step down when activity is present,
//! one step up when it is not, always clamped to the drive-voltage safety range.
//! The regulator never talks to the generator itself; callers decide what to do
//! with the voltage it returns.

use log::debug;
use serde::Deserialize;

use crate::error::{DaqError, DaqResult};

pub mod register;
pub mod spectrum;

pub use register::RollingRegister;
pub use spectrum::Spectrum;

/// Lowest drive voltage the regulator will ever command, in volts.
pub const MIN_DRIVE_VOLTAGE: f64 = 0.020;
/// Highest drive voltage the regulator will ever command, in volts.
pub const MAX_DRIVE_VOLTAGE: f64 = 2.0;

/// Half-width of the close energy window, as a fraction of the band center.
const CLOSE_BAND_HALF_WIDTH: f64 = 0.05;
/// Half-width of the far energy window, as a fraction of the band center.
const FAR_BAND_HALF_WIDTH: f64 = 0.10;
/// Fraction of total spectral energy below which a band reads as empty.
const NEGLIGIBLE_ENERGY_RATIO: f64 = 1e-12;

/// One detection band and its empirically fitted threshold.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DetectionBand {
    /// Band center as a multiple of the drive frequency.
    pub multiple: f64,
    /// Energy-ratio threshold above which the band reads as present.
    pub threshold: f64,
}

/// Configuration for the [`AmplitudeRegulator`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    /// Number of recent captures averaged per detection decision.
    pub window_length: usize,
    /// Voltage step applied per update, in volts.
    pub voltage_step: f64,
    /// Detection bands checked on every update.
    pub bands: Vec<DetectionBand>,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            window_length: 5,
            voltage_step: 0.02,
            bands: vec![
                DetectionBand {
                    multiple: 1.5,
                    threshold: 0.95,
                },
                DetectionBand {
                    multiple: 2.5,
                    threshold: 1.0,
                },
            ],
        }
    }
}

/// Drive point tracked while regulating: commanded voltage plus the frequencies
/// the detection math depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeState {
    /// Commanded generator voltage in volts.
    pub voltage: f64,
    /// Generator drive frequency in Hz.
    pub frequency: f64,
    /// Scope sample rate in Hz.
    pub sample_rate: f64,
}

/// Clamps `x` into `[lo, hi]`.
pub fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Whether the detection math can work with this drive point. Instruments
/// report a zero sample rate while unarmed; NaN and negatives are equally
/// unusable.
fn analyzable(drive_frequency: f64, sample_rate: f64) -> bool {
    drive_frequency.is_finite()
        && drive_frequency > 0.0
        && sample_rate.is_finite()
        && sample_rate > 0.0
}

/// Bang-bang amplitude regulator driven by subharmonic detection.
pub struct AmplitudeRegulator {
    register: RollingRegister<Vec<f64>>,
    voltage_step: f64,
    bands: Vec<DetectionBand>,
    last_safe: Option<f64>,
}

impl AmplitudeRegulator {
    /// Creates a regulator with an empty capture history.
    ///
    /// # Panics
    ///
    /// Panics if the window length is zero or the voltage step is not positive.
    pub fn new(config: RegulatorConfig) -> Self {
        assert!(
            config.voltage_step > 0.0,
            "Voltage step must be positive"
        );
        Self {
            register: RollingRegister::new(config.window_length),
            voltage_step: config.voltage_step,
            bands: config.bands,
            last_safe: None,
        }
    }

    /// Number of captures currently registered.
    pub fn frames_registered(&self) -> usize {
        self.register.len()
    }

    /// Voltage returned by the most recent completed update, if any.
    pub fn last_safe_voltage(&self) -> Option<f64> {
        self.last_safe
    }

    /// Adds one capture to the detection history.
    ///
    /// Empty captures and captures whose length disagrees with the history are
    /// rejected with `ShapeMismatch` and leave the history untouched; the last
    /// safe voltage stands until a well-formed capture arrives. Changing the
    /// record length legitimately means building a fresh regulator.
    pub fn register_frame(&mut self, samples: &[f64]) -> DaqResult<()> {
        if samples.is_empty() {
            return Err(DaqError::ShapeMismatch("empty capture".to_string()));
        }
        if let Some(front) = self.register.front() {
            if front.len() != samples.len() {
                return Err(DaqError::ShapeMismatch(format!(
                    "capture holds {} samples but history holds {}",
                    samples.len(),
                    front.len()
                )));
            }
        }
        self.register.append(samples.to_vec());
        Ok(())
    }

    /// Computes the next drive voltage from `v0`.
    ///
    /// With fewer than two registered captures there is nothing to average, so
    /// `v0` comes back unchanged; a drive point whose frequency or sample rate
    /// is not finite and positive cannot be analyzed and holds `v0` the same
    /// way. Otherwise the result is `v0` stepped once and clamped to
    /// `[MIN_DRIVE_VOLTAGE, MAX_DRIVE_VOLTAGE]`.
    pub fn update_amplitude(&mut self, v0: f64, drive_frequency: f64, sample_rate: f64) -> f64 {
        if !analyzable(drive_frequency, sample_rate) {
            debug!(
                "Drive point unusable ({} Hz at {} Hz sample rate); holding {:.3} V",
                drive_frequency, sample_rate, v0
            );
            return v0;
        }
        if self.register.len() < 2 {
            return v0;
        }
        let detected = self.subharmonic_present(drive_frequency, sample_rate);
        let stepped = if detected {
            v0 - self.voltage_step
        } else {
            v0 + self.voltage_step
        };
        let next = clip(stepped, MIN_DRIVE_VOLTAGE, MAX_DRIVE_VOLTAGE);
        debug!(
            "Amplitude update: {:.3} V -> {:.3} V (subharmonic {})",
            v0,
            next,
            if detected { "present" } else { "absent" }
        );
        self.last_safe = Some(next);
        next
    }

    /// Whether any detection band shows subharmonic activity in the averaged
    /// capture history. Requires at least two registered captures and a finite,
    /// positive drive frequency and sample rate.
    pub fn subharmonic_present(&self, drive_frequency: f64, sample_rate: f64) -> bool {
        if self.register.len() < 2 || !analyzable(drive_frequency, sample_rate) {
            return false;
        }
        let averaged = self.averaged_frame();
        let spectrum = Spectrum::from_samples(&averaged, sample_rate);
        self.bands
            .iter()
            .any(|band| Self::band_present(&spectrum, *band, drive_frequency))
    }

    fn band_present(spectrum: &Spectrum, band: DetectionBand, drive_frequency: f64) -> bool {
        let center = band.multiple * drive_frequency;
        let close = spectrum.band_energy(center, CLOSE_BAND_HALF_WIDTH);
        let far = spectrum.band_energy(center, FAR_BAND_HALF_WIDTH);
        // A band holding no real energy decides nothing; energy below the
        // numeric floor reads as no energy at all.
        let floor = NEGLIGIBLE_ENERGY_RATIO * spectrum.total_energy();
        if far <= floor {
            return false;
        }
        let ratio = 2.0 * close / far;
        ratio > band.threshold
    }

    /// Per-point mean of the registered captures.
    fn averaged_frame(&self) -> Vec<f64> {
        let count = self.register.len() as f64;
        let mut iter = self.register.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let mut averaged = first.clone();
        for frame in iter {
            for (acc, &v) in averaged.iter_mut().zip(frame) {
                *acc += v;
            }
        }
        for acc in &mut averaged {
            *acc /= count;
        }
        averaged
    }
}
