//! Mock instruments that stand in for scope and generator hardware.
//!
//! Both mocks answer every request in-process, so the full pipeline can run in
//! tests and demos with no hardware attached. The scope synthesizes a sine at a
//! configurable drive frequency and can inject a component at 1.5x that
//! frequency to exercise the amplitude regulator's detection path.

use async_trait::async_trait;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::attribute::{AttributeId, AttributeValue, MethodId};
use super::waveform::time_axis;
use super::{Instrument, Target};
use crate::error::{DaqError, DaqResult};

fn closed_handle(target: Target) -> DaqError {
    DaqError::Connection {
        target,
        reason: "handle is closed".to_string(),
    }
}

fn unknown_attribute(target: Target, id: AttributeId) -> DaqError {
    DaqError::AttributeNotFound {
        target,
        attribute: id.name().to_string(),
    }
}

/// Synthetic oscilloscope.
pub struct MockScope {
    name: String,
    sample_rate: f64,
    record_length: usize,
    channel: i64,
    always_triggered: bool,
    drive_frequency: f64,
    subharmonic_level: f64,
    noise_level: f64,
    fixed_frame: Option<Vec<f64>>,
    response_delay: Option<std::time::Duration>,
    rng: StdRng,
    closed: bool,
}

impl Default for MockScope {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScope {
    pub fn new() -> Self {
        Self {
            name: "Mock Scope".to_string(),
            sample_rate: 2.5e6,
            record_length: 1000,
            channel: 1,
            always_triggered: true,
            drive_frequency: 1.0e5,
            subharmonic_level: 0.0,
            noise_level: 0.0,
            fixed_frame: None,
            response_delay: None,
            rng: StdRng::seed_from_u64(0x5c0_9e),
            closed: false,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_record_length(mut self, record_length: usize) -> Self {
        self.record_length = record_length;
        self
    }

    pub fn with_drive_frequency(mut self, frequency: f64) -> Self {
        self.drive_frequency = frequency;
        self
    }

    /// Injects a component at 1.5x the drive frequency, `level` relative to the
    /// fundamental.
    pub fn with_subharmonic(mut self, level: f64) -> Self {
        self.subharmonic_level = level;
        self
    }

    pub fn with_noise(mut self, level: f64) -> Self {
        self.noise_level = level;
        self
    }

    /// Returns exactly this frame from every fetch instead of synthesizing one.
    pub fn with_fixed_frame(mut self, frame: Vec<f64>) -> Self {
        self.fixed_frame = Some(frame);
        self
    }

    /// Holds the trigger status low so the acquisition loop never fetches.
    pub fn with_trigger_held(mut self) -> Self {
        self.always_triggered = false;
        self
    }

    /// Delays every reply, for exercising request deadlines.
    pub fn with_response_delay(mut self, delay: std::time::Duration) -> Self {
        self.response_delay = Some(delay);
        self
    }

    async fn settle(&self) {
        if let Some(delay) = self.response_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn synthesize(&mut self) -> Vec<f64> {
        if let Some(frame) = &self.fixed_frame {
            return frame.clone();
        }
        let omega = 2.0 * std::f64::consts::PI * self.drive_frequency;
        let mut samples = Vec::with_capacity(self.record_length);
        for i in 0..self.record_length {
            let t = i as f64 / self.sample_rate;
            let mut v = (omega * t).sin();
            if self.subharmonic_level > 0.0 {
                v += self.subharmonic_level * (1.5 * omega * t).sin();
            }
            if self.noise_level > 0.0 {
                v += self.noise_level * self.rng.gen_range(-1.0..1.0);
            }
            samples.push(v);
        }
        samples
    }
}

#[async_trait]
impl Instrument for MockScope {
    fn id(&self) -> &str {
        &self.name
    }

    async fn get(&mut self, id: AttributeId) -> DaqResult<AttributeValue> {
        if self.closed {
            return Err(closed_handle(Target::Scope));
        }
        self.settle().await;
        match id {
            AttributeId::InstrumentName => Ok(AttributeValue::String(self.name.clone())),
            AttributeId::AnalogSampleRate => Ok(AttributeValue::Float(self.sample_rate)),
            AttributeId::Triggered => Ok(AttributeValue::Bool(self.always_triggered)),
            AttributeId::RecordLength => Ok(AttributeValue::Int(self.record_length as i64)),
            AttributeId::Channel => Ok(AttributeValue::Int(self.channel)),
            other => Err(unknown_attribute(Target::Scope, other)),
        }
    }

    async fn set(&mut self, id: AttributeId, value: AttributeValue) -> DaqResult<()> {
        if self.closed {
            return Err(closed_handle(Target::Scope));
        }
        self.settle().await;
        match id {
            AttributeId::Channel => {
                self.channel = value.as_i64().unwrap_or(self.channel);
                Ok(())
            }
            other => Err(unknown_attribute(Target::Scope, other)),
        }
    }

    async fn call(&mut self, method: MethodId, _args: &[AttributeValue]) -> DaqResult<AttributeValue> {
        if self.closed {
            return Err(closed_handle(Target::Scope));
        }
        self.settle().await;
        match method {
            MethodId::FetchXData => Ok(AttributeValue::FloatArray(time_axis(
                self.record_length,
                self.sample_rate,
            ))),
        }
    }

    async fn fetch_waveform(&mut self) -> DaqResult<Vec<f64>> {
        if self.closed {
            return Err(closed_handle(Target::Scope));
        }
        self.settle().await;
        Ok(self.synthesize())
    }

    async fn close(&mut self) -> DaqResult<()> {
        if !self.closed {
            info!("Closing {}", self.name);
            self.closed = true;
        }
        Ok(())
    }
}

/// Synthetic signal generator.
pub struct MockGenerator {
    name: String,
    frequency: f64,
    amplitude: f64,
    output_on: bool,
    channel: i64,
    closed: bool,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            name: "Mock Generator".to_string(),
            frequency: 1.0e5,
            amplitude: 1.0,
            output_on: false,
            channel: 1,
            closed: false,
        }
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }
}

#[async_trait]
impl Instrument for MockGenerator {
    fn id(&self) -> &str {
        &self.name
    }

    async fn get(&mut self, id: AttributeId) -> DaqResult<AttributeValue> {
        if self.closed {
            return Err(closed_handle(Target::Generator));
        }
        match id {
            AttributeId::InstrumentName => Ok(AttributeValue::String(self.name.clone())),
            AttributeId::Frequency => Ok(AttributeValue::Float(self.frequency)),
            AttributeId::Amplitude => Ok(AttributeValue::Float(self.amplitude)),
            AttributeId::State => Ok(AttributeValue::Bool(self.output_on)),
            AttributeId::Channel => Ok(AttributeValue::Int(self.channel)),
            other => Err(unknown_attribute(Target::Generator, other)),
        }
    }

    async fn set(&mut self, id: AttributeId, value: AttributeValue) -> DaqResult<()> {
        if self.closed {
            return Err(closed_handle(Target::Generator));
        }
        match id {
            AttributeId::Frequency => {
                self.frequency = value.as_f64().unwrap_or(self.frequency);
                Ok(())
            }
            AttributeId::Amplitude => {
                self.amplitude = value.as_f64().unwrap_or(self.amplitude);
                Ok(())
            }
            AttributeId::State => {
                self.output_on = value.as_bool().unwrap_or(self.output_on);
                Ok(())
            }
            AttributeId::Channel => {
                self.channel = value.as_i64().unwrap_or(self.channel);
                Ok(())
            }
            other => Err(unknown_attribute(Target::Generator, other)),
        }
    }

    async fn call(&mut self, method: MethodId, _args: &[AttributeValue]) -> DaqResult<AttributeValue> {
        if self.closed {
            return Err(closed_handle(Target::Generator));
        }
        Err(DaqError::AttributeNotFound {
            target: Target::Generator,
            attribute: method.name().to_string(),
        })
    }

    async fn fetch_waveform(&mut self) -> DaqResult<Vec<f64>> {
        Err(DaqError::Connection {
            target: Target::Generator,
            reason: "generator has no capture path".to_string(),
        })
    }

    async fn close(&mut self) -> DaqResult<()> {
        if !self.closed {
            info!("Closing {}", self.name);
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_frame_is_returned_verbatim() {
        let frame = vec![0.25; 16];
        let mut scope = MockScope::new().with_fixed_frame(frame.clone());
        assert_eq!(scope.fetch_waveform().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn test_fetch_x_data_matches_record_settings() {
        let mut scope = MockScope::new()
            .with_record_length(8)
            .with_sample_rate(1000.0);
        let axis = scope
            .call(MethodId::FetchXData, &[])
            .await
            .unwrap();
        let axis = axis.as_float_array().unwrap().to_vec();
        assert_eq!(axis.len(), 8);
        assert!((axis[1] - 0.001).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_closed_scope_rejects_requests() {
        let mut scope = MockScope::new();
        scope.close().await.unwrap();
        assert!(matches!(
            scope.get(AttributeId::Triggered).await,
            Err(DaqError::Connection { .. })
        ));
        // A second close is harmless.
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_generator_set_get_round_trip() {
        let mut generator = MockGenerator::new();
        generator
            .set(AttributeId::Amplitude, AttributeValue::Float(0.5))
            .await
            .unwrap();
        assert_eq!(
            generator.get(AttributeId::Amplitude).await.unwrap(),
            AttributeValue::Float(0.5)
        );
        generator
            .set(AttributeId::State, AttributeValue::Bool(true))
            .await
            .unwrap();
        assert_eq!(
            generator.get(AttributeId::State).await.unwrap(),
            AttributeValue::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_scope_rejects_generator_attribute() {
        let mut scope = MockScope::new();
        assert!(matches!(
            scope.get(AttributeId::Frequency).await,
            Err(DaqError::AttributeNotFound { .. })
        ));
    }
}
