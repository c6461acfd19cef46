//! One-sided magnitude spectrum used by the subharmonic detector.

use num_complex::Complex;
use rustfft::FftPlanner;

/// One-sided magnitude spectrum of a real capture.
///
/// Magnitudes are linear (volts), normalized so a full-scale sine of amplitude A
/// shows up as A in its bin: DC carries `|X[0]|/N` and every other bin
/// `2|X[k]|/N`. Band queries integrate squared magnitude, so they report energy
/// rather than amplitude.
#[derive(Debug, Clone)]
pub struct Spectrum {
    bin_width: f64,
    magnitudes: Vec<f64>,
}

impl Spectrum {
    /// Computes the spectrum of `samples` captured at `sample_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate` is not positive.
    pub fn from_samples(samples: &[f64], sample_rate: f64) -> Self {
        assert!(sample_rate > 0.0, "Sampling rate must be positive");

        let n = samples.len();
        if n == 0 {
            return Self {
                bin_width: 0.0,
                magnitudes: Vec::new(),
            };
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);

        let mut complex_buffer: Vec<Complex<f64>> =
            samples.iter().map(|&val| Complex::new(val, 0.0)).collect();
        fft.process(&mut complex_buffer);

        let num_bins = n / 2;
        let mut magnitudes = Vec::with_capacity(num_bins);
        if num_bins > 0 {
            magnitudes.push(complex_buffer[0].norm() / n as f64);
        }
        for complex_val in complex_buffer.iter().take(num_bins).skip(1) {
            magnitudes.push((complex_val.norm() * 2.0) / n as f64);
        }

        Self {
            bin_width: sample_rate / n as f64,
            magnitudes,
        }
    }

    /// Frequency spacing between adjacent bins in Hz.
    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    /// Linear one-sided magnitudes, DC first.
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    /// Center frequency of `bin` in Hz.
    pub fn frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_width
    }

    /// Energy integrated over `center * (1 - half_width) ..= center * (1 + half_width)`.
    pub fn band_energy(&self, center: f64, half_width: f64) -> f64 {
        let lo = center * (1.0 - half_width);
        let hi = center * (1.0 + half_width);
        self.magnitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let f = self.frequency(*i);
                f >= lo && f <= hi
            })
            .map(|(_, &m)| m * m)
            .sum()
    }

    /// Energy integrated over the whole one-sided spectrum.
    pub fn total_energy(&self) -> f64 {
        self.magnitudes.iter().map(|&m| m * m).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f64, sample_rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate;
                (2.0 * std::f64::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_pure_sine_peaks_in_its_bin() {
        // 100 kHz at 2.5 MSa/s over 1000 points lands exactly in bin 40.
        let samples = sine(1.0e5, 2.5e6, 1000);
        let spectrum = Spectrum::from_samples(&samples, 2.5e6);

        assert!((spectrum.bin_width() - 2500.0).abs() < 1e-9);
        let peak = spectrum.magnitudes()[40];
        assert!((peak - 1.0).abs() < 1e-9, "peak magnitude: {}", peak);
        assert!(spectrum.magnitudes()[41] < 1e-9);
    }

    #[test]
    fn test_band_energy_captures_the_peak() {
        let samples = sine(1.0e5, 2.5e6, 1000);
        let spectrum = Spectrum::from_samples(&samples, 2.5e6);

        let on_peak = spectrum.band_energy(1.0e5, 0.05);
        let off_peak = spectrum.band_energy(2.0e5, 0.05);
        assert!((on_peak - 1.0).abs() < 1e-9, "on-peak energy: {}", on_peak);
        assert!(off_peak < 1e-18, "off-peak energy: {}", off_peak);
    }

    #[test]
    fn test_empty_capture_yields_empty_spectrum() {
        let spectrum = Spectrum::from_samples(&[], 1000.0);
        assert!(spectrum.magnitudes().is_empty());
        assert_eq!(spectrum.total_energy(), 0.0);
    }
}
