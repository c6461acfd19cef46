//! Waveform capture produced by the acquisition loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One capture read from the scope after a satisfied trigger.
///
/// Captures are handed to subscribers as `Arc<Waveform>`, so cloning one off the
/// output channel never copies the sample vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    /// Monotonic capture counter assigned by the acquisition loop.
    pub sequence: u64,
    /// Sample values in volts, in capture order.
    pub samples: Vec<f64>,
    /// Wall-clock time the capture was read out.
    pub captured_at: DateTime<Utc>,
}

impl Waveform {
    pub fn new(sequence: u64, samples: Vec<f64>) -> Self {
        Self {
            sequence,
            samples,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Capture time axis in seconds for `record_length` points at `sample_rate`.
///
/// Drivers use this to answer `fetch_x_data`; it is also handy for plotting a
/// [`Waveform`] whose driver reports only the sample rate.
pub fn time_axis(record_length: usize, sample_rate: f64) -> Vec<f64> {
    (0..record_length).map(|i| i as f64 / sample_rate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_axis_spacing_matches_sample_rate() {
        let axis = time_axis(4, 1000.0);
        assert_eq!(axis.len(), 4);
        assert!((axis[0]).abs() < 1e-12);
        assert!((axis[1] - 0.001).abs() < 1e-12);
        assert!((axis[3] - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_waveform_reports_length() {
        let w = Waveform::new(7, vec![0.0, 1.0, 0.0]);
        assert_eq!(w.sequence, 7);
        assert_eq!(w.len(), 3);
        assert!(!w.is_empty());
    }
}
